use bytes::Bytes;
use chrono::Utc;

use crate::context::AppContext;
use crate::gateway::types::{CreateJobRequest, JobMode};
use crate::gateway::GatewayError;
use crate::jobs::model::{FileMeta, JobPatch, JobRecord, JobStatus};

/// Longest instruction kept on the local record.
pub const INSTRUCTION_PREVIEW_CHARS: usize = 200;

/// Everything needed to start a job plus the local provenance to remember.
#[derive(Debug, Clone)]
pub struct SubmitJob {
    pub request: CreateJobRequest,
    pub template_file: Option<FileMeta>,
    pub source_files: Vec<FileMeta>,
}

impl SubmitJob {
    pub fn new(request: CreateJobRequest) -> Self {
        Self {
            request,
            template_file: None,
            source_files: Vec::new(),
        }
    }
}

fn preview(instruction: &str) -> String {
    instruction.chars().take(INSTRUCTION_PREVIEW_CHARS).collect()
}

/// Create the job on the backend and register it locally.
pub async fn submit(ctx: &AppContext, job: SubmitJob) -> anyhow::Result<JobRecord> {
    let created = ctx.gateway.create_job(&job.request).await?;
    let now = Utc::now();

    let patch = JobPatch {
        job_id: created.job_id.clone(),
        status: Some(created.status.unwrap_or(JobStatus::Queued)),
        stage: Some("queued".to_string()),
        outputs: Some(Vec::new()),
        error: Some(None),
        created_at: Some(now),
        local_created_at: Some(now),
        docset_id: Some(job.request.docset_id.clone()),
        template_id: Some(job.request.template_id.clone()),
        template_file: job.template_file,
        source_files: Some(job.source_files),
        instruction: Some(preview(&job.request.instruction)),
        model: Some(job.request.model_options.model.clone()),
        last_request: Some(job.request),
        last_response: None,
    };

    let record = ctx.store.upsert(patch).await?;
    tracing::info!(job_id = %record.job_id, docset_id = ?record.docset_id, template_id = ?record.template_id, "job submitted");
    Ok(record)
}

/// Start a brand-new job with the inputs of an existing one. The old record
/// is left as it is.
pub async fn resubmit(ctx: &AppContext, job_id: &str) -> anyhow::Result<JobRecord> {
    let old = ctx
        .store
        .get(job_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("unknown job {job_id}"))?;

    let request = match old.last_request.clone() {
        Some(mut req) => {
            req.mode = JobMode::Async;
            req
        }
        None => {
            let (Some(docset_id), Some(template_id)) = (old.docset_id.clone(), old.template_id.clone())
            else {
                anyhow::bail!("job {job_id} has no docset_id/template_id to retry with");
            };
            let mut req =
                CreateJobRequest::new(docset_id, template_id, old.instruction.clone().unwrap_or_default());
            if let Some(model) = old.model.clone() {
                req.model_options.model = model;
            }
            req
        }
    };

    let record = submit(
        ctx,
        SubmitJob {
            request,
            template_file: old.template_file.clone(),
            source_files: old.source_files.clone(),
        },
    )
    .await?;
    tracing::info!(previous = %job_id, job_id = %record.job_id, "job resubmitted");
    Ok(record)
}

/// Fetch the latest status once and merge it.
///
/// A 404 for a job that is already terminal locally is treated as a no-op
/// and the stored record is returned unchanged.
pub async fn refresh(ctx: &AppContext, job_id: &str) -> anyhow::Result<JobRecord> {
    match ctx.gateway.get_job(job_id).await {
        Ok(snapshot) => {
            let mut patch = JobPatch::from_snapshot(snapshot);
            patch.job_id = job_id.to_string();
            ctx.store.upsert(patch).await
        }
        Err(e) if e.is_not_found() => match ctx.store.get(job_id).await {
            Some(local) if local.status.is_terminal() => {
                tracing::debug!(job_id = %job_id, "backend no longer knows terminal job");
                Ok(local)
            }
            _ => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    }
}

/// A downloaded output file.
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub content: Bytes,
}

pub async fn download(ctx: &AppContext, job_id: &str, index: usize) -> anyhow::Result<Download> {
    let record = ctx
        .store
        .get(job_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("unknown job {job_id}"))?;
    let Some(output) = record.outputs.get(index) else {
        anyhow::bail!("job {job_id} has no output #{index}");
    };

    let content = ctx
        .gateway
        .download_output(job_id, index)
        .await
        .map_err(|e: GatewayError| anyhow::anyhow!("download failed: {e}"))?;

    let filename = if output.filename.trim().is_empty() {
        format!("filled_{job_id}")
    } else {
        output.filename.clone()
    };
    Ok(Download { filename, content })
}
