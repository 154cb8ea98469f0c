use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::model::{JobRecord, JobStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListItem {
    pub job_id: String,
    pub status: JobStatus,
    pub stage: Option<String>,

    pub docset_id: Option<String>,
    pub template_id: Option<String>,
    pub output_count: usize,

    pub error_code: Option<String>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&JobRecord> for JobListItem {
    fn from(r: &JobRecord) -> Self {
        Self {
            job_id: r.job_id.clone(),
            status: r.status,
            stage: r.stage.clone(),
            docset_id: r.docset_id.clone(),
            template_id: r.template_id.clone(),
            output_count: r.outputs.len(),
            error_code: r.error.as_ref().map(|e| e.code.clone()),
            error_message: r.error.as_ref().map(|e| e.message.clone()),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
