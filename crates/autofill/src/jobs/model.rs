use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::gateway::types::CreateJobRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    /// No transition is possible out of a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Queued or running: still worth polling.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub filename: String,
    pub download_url: String,
}

/// Failure payload carried by a job that resolved to `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub detail: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Status document returned by the backend for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub outputs: Vec<JobOutput>,
    #[serde(default)]
    pub error: Option<JobFailure>,
    #[serde(
        default,
        serialize_with = "chrono::serde::ts_milliseconds_option::serialize",
        deserialize_with = "lenient_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        serialize_with = "chrono::serde::ts_milliseconds_option::serialize",
        deserialize_with = "lenient_timestamp"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Numbers below this are taken as epoch seconds, anything larger as
/// milliseconds.
const SECONDS_CUTOFF: f64 = 1e11;

/// Backend timestamps arrive as epoch numbers (seconds or milliseconds,
/// possibly fractional) or RFC 3339 strings. Anything else reads as absent.
pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => from_epoch(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            match DateTime::parse_from_rfc3339(s) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(_) => from_epoch(s.parse().ok()?),
            }
        }
        _ => None,
    }
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() < SECONDS_CUTOFF {
        value * 1000.0
    } else {
        value
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

/// A job as the client remembers it: backend state plus local provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub outputs: Vec<JobOutput>,
    #[serde(default)]
    pub error: Option<JobFailure>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub local_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub docset_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template_file: Option<FileMeta>,
    #[serde(default)]
    pub source_files: Vec<FileMeta>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub last_request: Option<CreateJobRequest>,
    #[serde(default)]
    pub last_response: Option<Value>,
}

/// Partial record fed to the store. `None` means "not part of this
/// observation"; only `error` can be explicitly cleared (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub job_id: String,
    pub status: Option<JobStatus>,
    pub stage: Option<String>,
    pub outputs: Option<Vec<JobOutput>>,
    pub error: Option<Option<JobFailure>>,
    pub created_at: Option<DateTime<Utc>>,

    pub local_created_at: Option<DateTime<Utc>>,
    pub docset_id: Option<String>,
    pub template_id: Option<String>,
    pub template_file: Option<FileMeta>,
    pub source_files: Option<Vec<FileMeta>>,
    pub instruction: Option<String>,
    pub model: Option<String>,
    pub last_request: Option<CreateJobRequest>,
    pub last_response: Option<Value>,
}

impl JobPatch {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Self::default()
        }
    }

    /// Patch for a status fetch. The raw snapshot is kept as `last_response`.
    pub fn from_snapshot(snapshot: JobSnapshot) -> Self {
        let raw = serde_json::to_value(&snapshot).ok();
        Self {
            job_id: snapshot.job_id,
            status: Some(snapshot.status),
            stage: snapshot.stage,
            outputs: Some(snapshot.outputs),
            error: Some(snapshot.error),
            created_at: snapshot.created_at,
            last_response: raw,
            ..Self::default()
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

impl JobRecord {
    /// Build a fresh record; unspecified fields take their defaults.
    pub fn from_patch(patch: JobPatch, now: DateTime<Utc>) -> Self {
        Self {
            job_id: patch.job_id,
            status: patch.status.unwrap_or(JobStatus::Queued),
            stage: patch.stage,
            outputs: patch.outputs.unwrap_or_default(),
            error: patch.error.flatten(),
            created_at: patch.created_at.unwrap_or(now),
            updated_at: now,
            local_created_at: patch.local_created_at,
            docset_id: patch.docset_id,
            template_id: patch.template_id,
            template_file: patch.template_file,
            source_files: patch.source_files.unwrap_or_default(),
            instruction: patch.instruction,
            model: patch.model,
            last_request: patch.last_request,
            last_response: patch.last_response,
        }
    }

    /// Shallow merge, patch fields win, except that a terminal record keeps
    /// its status, stage, outputs and error regardless of what arrives later.
    pub fn apply(&mut self, patch: JobPatch, now: DateTime<Utc>) {
        if !self.status.is_terminal() {
            if let Some(status) = patch.status {
                self.status = status;
            }
            if let Some(stage) = patch.stage {
                self.stage = Some(stage);
            }
            if let Some(outputs) = patch.outputs {
                if self.outputs.is_empty() {
                    self.outputs = outputs;
                }
            }
            if let Some(error) = patch.error {
                self.error = error;
            }
        }

        if patch.local_created_at.is_some() {
            self.local_created_at = patch.local_created_at;
        }
        if patch.docset_id.is_some() {
            self.docset_id = patch.docset_id;
        }
        if patch.template_id.is_some() {
            self.template_id = patch.template_id;
        }
        if patch.template_file.is_some() {
            self.template_file = patch.template_file;
        }
        if let Some(files) = patch.source_files {
            self.source_files = files;
        }
        if patch.instruction.is_some() {
            self.instruction = patch.instruction;
        }
        if patch.model.is_some() {
            self.model = patch.model;
        }
        if patch.last_request.is_some() {
            self.last_request = patch.last_request;
        }
        if patch.last_response.is_some() {
            self.last_response = patch.last_response;
        }

        self.updated_at = self.updated_at.max(now);
    }
}
