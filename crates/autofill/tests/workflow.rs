mod common;

use std::sync::Arc;

use common::{context_with, quiet_simulator, reply, Reply, ScriptedGateway};

use autofill::context::AppContext;
use autofill::gateway::{CreateJobRequest, Gateway, JobMode, UploadFile};
use autofill::jobs::submit::{self, SubmitJob, INSTRUCTION_PREVIEW_CHARS};
use autofill::jobs::{store_sink, JobPatch, JobPoller, JobStatus, JobStore};
use autofill::Config;

#[tokio::test(start_paused = true)]
async fn submit_poll_and_download_against_simulator() {
    let ctx = context_with(Arc::new(quiet_simulator(0.0, 21)));

    let docset = ctx
        .gateway
        .create_document_set(vec![UploadFile::new("notes.md", "# notes")], None)
        .await
        .unwrap();
    let template = UploadFile::new("template.xlsx", vec![0u8; 32]);
    let template_meta = template.meta();
    let uploaded = ctx.gateway.upload_template(template, None).await.unwrap();

    let mut job = SubmitJob::new(CreateJobRequest::new(
        &docset.docset_id,
        &uploaded.template_id,
        "fill template",
    ));
    job.template_file = Some(template_meta.clone());
    job.source_files = docset.files.clone();

    let record = submit::submit(&ctx, job).await.unwrap();
    assert_eq!(record.status, JobStatus::Queued);
    assert_eq!(record.docset_id.as_deref(), Some(docset.docset_id.as_str()));
    assert_eq!(record.template_file, Some(template_meta));
    assert_eq!(record.source_files.len(), 1);
    assert_eq!(record.instruction.as_deref(), Some("fill template"));
    assert!(record.local_created_at.is_some());
    assert!(record.last_request.is_some());

    JobPoller::from_context(&ctx)
        .spawn(record.job_id.clone(), store_sink(ctx.store.clone()))
        .join()
        .await;

    let done = ctx.store.get(&record.job_id).await.unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.outputs.len(), 1);
    assert!(done.error.is_none());
    assert!(done.updated_at >= done.created_at);
    // provenance survives the status merges
    assert_eq!(done.instruction.as_deref(), Some("fill template"));
    assert!(done.last_response.is_some());

    let file = submit::download(&ctx, &record.job_id, 0).await.unwrap();
    assert_eq!(file.filename, done.outputs[0].filename);
    assert!(String::from_utf8_lossy(&file.content).starts_with("Mock file for "));
}

#[tokio::test(start_paused = true)]
async fn failed_job_is_retried_as_a_new_job() {
    let ctx = context_with(Arc::new(quiet_simulator(1.0, 22)));

    let first = submit::submit(
        &ctx,
        SubmitJob::new(CreateJobRequest::new("ds_1", "tp_1", "fill template")),
    )
    .await
    .unwrap();
    JobPoller::from_context(&ctx)
        .spawn(first.job_id.clone(), store_sink(ctx.store.clone()))
        .join()
        .await;

    let failed = ctx.store.get(&first.job_id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(submit::download(&ctx, &first.job_id, 0).await.is_err());

    let second = submit::resubmit(&ctx, &first.job_id).await.unwrap();
    assert_ne!(second.job_id, first.job_id);
    assert_eq!(second.status, JobStatus::Queued);
    assert_eq!(second.docset_id.as_deref(), Some("ds_1"));
    assert_eq!(second.template_id.as_deref(), Some("tp_1"));

    let records = ctx.store.list().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].job_id, second.job_id);
    assert_eq!(records[1].status, JobStatus::Failed);
}

#[tokio::test]
async fn resubmit_forces_async_mode_and_keeps_options() {
    let gateway = ScriptedGateway::new();
    let ctx = context_with(gateway.clone());

    let mut req = CreateJobRequest::new("ds_9", "tp_9", "only the totals");
    req.mode = JobMode::Sync;
    req.model_options.model = "other-model".to_string();
    let first = submit::submit(&ctx, SubmitJob::new(req)).await.unwrap();
    let second = submit::resubmit(&ctx, &first.job_id).await.unwrap();

    assert_eq!(second.job_id, "job_2");
    let sent = gateway.requests();
    assert_eq!(sent[0].mode, JobMode::Sync);
    assert_eq!(sent[1].mode, JobMode::Async);
    assert_eq!(sent[1].model_options.model, "other-model");
    assert_eq!(sent[1].instruction, "only the totals");
}

#[tokio::test]
async fn resubmit_without_stored_request_rebuilds_it() {
    let gateway = ScriptedGateway::new();
    let ctx = context_with(gateway.clone());

    let mut patch = JobPatch::new("old").status(JobStatus::Failed);
    patch.docset_id = Some("ds_1".to_string());
    patch.template_id = Some("tp_1".to_string());
    patch.instruction = Some("fill template".to_string());
    ctx.store.upsert(patch).await.unwrap();

    submit::resubmit(&ctx, "old").await.unwrap();
    let sent = gateway.requests();
    assert_eq!(sent[0].docset_id, "ds_1");
    assert_eq!(sent[0].instruction, "fill template");

    ctx.store.upsert(JobPatch::new("bare")).await.unwrap();
    assert!(submit::resubmit(&ctx, "bare").await.is_err());
    assert!(submit::resubmit(&ctx, "missing").await.is_err());
}

#[tokio::test]
async fn long_instruction_is_truncated_on_the_record() {
    let gateway = ScriptedGateway::new();
    let ctx = context_with(gateway.clone());

    let long = "é".repeat(INSTRUCTION_PREVIEW_CHARS + 50);
    let record = submit::submit(
        &ctx,
        SubmitJob::new(CreateJobRequest::new("ds_1", "tp_1", long.clone())),
    )
    .await
    .unwrap();

    assert_eq!(
        record.instruction.unwrap().chars().count(),
        INSTRUCTION_PREVIEW_CHARS
    );
    // the backend still got all of it
    assert_eq!(gateway.requests()[0].instruction, long);
}

#[tokio::test]
async fn empty_instruction_uses_default() {
    let req = CreateJobRequest::new("ds_1", "tp_1", "   ");
    assert_eq!(req.instruction, autofill::gateway::types::DEFAULT_INSTRUCTION);
}

#[tokio::test]
async fn refresh_merges_latest_status() {
    let gateway = ScriptedGateway::new();
    gateway.script("job_1", vec![reply("job_1", JobStatus::Running)]);
    let ctx = context_with(gateway.clone());
    ctx.store.upsert(JobPatch::new("job_1")).await.unwrap();

    let rec = submit::refresh(&ctx, "job_1").await.unwrap();
    assert_eq!(rec.status, JobStatus::Running);
}

#[tokio::test]
async fn not_found_after_terminal_is_a_no_op() {
    let gateway = ScriptedGateway::new();
    gateway.script("job_1", vec![Reply::Status(404)]);
    let ctx = context_with(gateway.clone());

    ctx.store
        .upsert(JobPatch::from_snapshot(common::snapshot("job_1", JobStatus::Succeeded)))
        .await
        .unwrap();
    let before = ctx.store.get("job_1").await.unwrap();

    let rec = submit::refresh(&ctx, "job_1").await.unwrap();
    assert_eq!(rec, before);

    // an active job that vanished is still an error
    ctx.store.upsert(JobPatch::new("job_2")).await.unwrap();
    gateway.script("job_2", vec![Reply::Status(404)]);
    assert!(submit::refresh(&ctx, "job_2").await.is_err());
}

#[tokio::test]
async fn download_needs_a_local_output() {
    let ctx = context_with(ScriptedGateway::new());

    assert!(submit::download(&ctx, "nope", 0).await.is_err());

    ctx.store.upsert(JobPatch::new("job_1").status(JobStatus::Running)).await.unwrap();
    assert!(submit::download(&ctx, "job_1", 0).await.is_err());

    ctx.store
        .upsert(JobPatch::from_snapshot(common::snapshot("job_1", JobStatus::Succeeded)))
        .await
        .unwrap();
    let file = submit::download(&ctx, "job_1", 0).await.unwrap();
    assert_eq!(file.filename, "filled_job_1.xlsx");
    assert_eq!(&file.content[..], b"job_1:0");
    assert!(submit::download(&ctx, "job_1", 1).await.is_err());
}

#[tokio::test]
async fn submitted_jobs_persist_across_contexts() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = ScriptedGateway::new();

    let store = JobStore::open(dir.path()).await;
    let ctx = AppContext::with_parts(Config::default(), store, gateway.clone());
    let record = submit::submit(
        &ctx,
        SubmitJob::new(CreateJobRequest::new("ds_1", "tp_1", "fill template")),
    )
    .await
    .unwrap();

    let reopened = JobStore::open(dir.path()).await;
    let restored = reopened.get(&record.job_id).await.unwrap();
    assert_eq!(restored.last_request, record.last_request);
    assert_eq!(restored.status, JobStatus::Queued);
    assert_eq!(reopened.active_ids().await, vec![record.job_id]);
}
