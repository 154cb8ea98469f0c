use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::model::{FileMeta, JobStatus};

pub const DEFAULT_MODEL: &str = "chatgpt5.2-thinking";
pub const DEFAULT_INSTRUCTION: &str =
    "Read the document set and fill in the template. Output only the final filled file.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    #[default]
    Async,
    Sync,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryLimit {
    #[serde(rename = "1g")]
    G1,
    #[default]
    #[serde(rename = "4g")]
    G4,
    #[serde(rename = "16g")]
    G16,
    #[serde(rename = "64g")]
    G64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    pub model: String,
    pub reasoning_effort: ReasoningEffort,
    pub memory_limit: MemoryLimit,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            reasoning_effort: ReasoningEffort::default(),
            memory_limit: MemoryLimit::default(),
        }
    }
}

/// Body of `POST /jobs/fill-template`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub docset_id: String,
    pub template_id: String,
    #[serde(default)]
    pub mode: JobMode,
    #[serde(default)]
    pub model_options: ModelOptions,
    pub instruction: String,
}

impl CreateJobRequest {
    /// Request with the recommended options; an empty instruction falls back
    /// to the default one.
    pub fn new(
        docset_id: impl Into<String>,
        template_id: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        let instruction = instruction.into();
        let instruction = if instruction.trim().is_empty() {
            DEFAULT_INSTRUCTION.to_string()
        } else {
            instruction
        };
        Self {
            docset_id: docset_id.into(),
            template_id: template_id.into(),
            mode: JobMode::Async,
            model_options: ModelOptions::default(),
            instruction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCreated {
    pub job_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsetCreated {
    pub docset_id: String,
    #[serde(default)]
    pub files: Vec<FileMeta>,
    #[serde(
        default,
        serialize_with = "chrono::serde::ts_milliseconds_option::serialize",
        deserialize_with = "crate::jobs::model::lenient_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateUploaded {
    pub template_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A file about to be sent in a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("not a file path: {}", path.display()))?
            .to_string();
        Ok(Self::new(name, data))
    }

    pub fn meta(&self) -> FileMeta {
        FileMeta {
            name: self.name.clone(),
            size: self.data.len() as u64,
            content_type: self.content_type.clone(),
        }
    }
}
