mod common;

use std::time::Duration;

use chrono::Utc;
use common::quiet_simulator;

use autofill::gateway::{CreateJobRequest, Gateway, UploadFile};
use autofill::jobs::{FileMeta, JobStatus};
use autofill::sim::backend::{FAILURE_CODE, RUNNING_STAGE};
use autofill::sim::{Resolution, SimBackend, SimOp, SimTiming};

fn request() -> CreateJobRequest {
    CreateJobRequest::new("ds_1", "tp_1", "fill template")
}

fn timing(failure_rate: f64) -> SimTiming {
    SimTiming {
        failure_rate,
        ..SimTiming::default()
    }
}

#[test]
fn ids_carry_their_prefix() {
    let mut sim = SimBackend::seeded(SimTiming::default(), 1);
    let ds = sim.create_docset(Vec::new(), None, Utc::now());
    let tp = sim.upload_template(
        FileMeta {
            name: "t.xlsx".to_string(),
            size: 10,
            content_type: None,
        },
        None,
    );
    let (job, _) = sim.create_job(&request(), Utc::now());

    for (id, prefix) in [(&ds.docset_id, "ds_"), (&tp.template_id, "tp_"), (&job.job_id, "job_")] {
        let suffix = id.strip_prefix(prefix).expect("prefix");
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
    assert_eq!(tp.name.as_deref(), Some("t.xlsx"));
    assert_eq!(sim.docset_count(), 1);
    assert_eq!(sim.template_count(), 1);
}

#[test]
fn new_job_is_queued_with_a_plan_in_range() {
    let mut sim = SimBackend::seeded(SimTiming::default(), 2);
    let (created, plan) = sim.create_job(&request(), Utc::now());

    assert_eq!(created.status, Some(JobStatus::Queued));
    let snap = sim.get_job(&created.job_id).unwrap();
    assert_eq!(snap.status, JobStatus::Queued);
    assert!(snap.outputs.is_empty());
    assert!(snap.error.is_none());

    assert!(plan.start_after >= Duration::from_millis(800));
    assert!(plan.start_after <= Duration::from_millis(1600));
    assert!(plan.resolve_after >= Duration::from_millis(4500));
    assert!(plan.resolve_after <= Duration::from_millis(10_500));
    assert_eq!(sim.plan(&created.job_id), Some(plan));
    assert_eq!(sim.request(&created.job_id), Some(&request()));
}

#[test]
fn successful_job_walks_the_state_machine() {
    let mut sim = SimBackend::seeded(timing(0.0), 3);
    let (created, plan) = sim.create_job(&request(), Utc::now());
    assert_eq!(plan.resolution, Resolution::Succeed);
    let id = created.job_id.as_str();

    assert_eq!(sim.advance(id, Utc::now()), Some(JobStatus::Running));
    let snap = sim.get_job(id).unwrap();
    assert_eq!(snap.stage.as_deref(), Some(RUNNING_STAGE));
    assert!(snap.outputs.is_empty());

    assert_eq!(sim.advance(id, Utc::now()), Some(JobStatus::Succeeded));
    let snap = sim.get_job(id).unwrap();
    assert_eq!(snap.stage.as_deref(), Some("done"));
    assert!(snap.error.is_none());
    assert_eq!(snap.outputs.len(), 1);
    let out = &snap.outputs[0];
    assert!(out.filename.starts_with("filled_") && out.filename.ends_with(".xlsx"));
    assert_eq!(out.download_url, format!("/api/v1/jobs/{id}/files/0"));

    // terminal jobs stay put
    assert_eq!(sim.advance(id, Utc::now()), Some(JobStatus::Succeeded));
    assert_eq!(sim.get_job(id).unwrap(), snap);
}

#[test]
fn failed_job_has_error_and_no_outputs() {
    let mut sim = SimBackend::seeded(timing(1.0), 4);
    let (created, plan) = sim.create_job(&request(), Utc::now());
    assert_eq!(plan.resolution, Resolution::Fail);
    let id = created.job_id.as_str();

    sim.advance(id, Utc::now());
    assert_eq!(sim.advance(id, Utc::now()), Some(JobStatus::Failed));

    let snap = sim.get_job(id).unwrap();
    assert!(snap.outputs.is_empty());
    let err = snap.error.unwrap();
    assert_eq!(err.code, FAILURE_CODE);
    assert_eq!(err.message, "Upstream failure (simulated)");
    assert_eq!(err.detail["hint"], "Retry creates a new job");
    assert!(sim.output(id, 0).is_none());
}

#[test]
fn unknown_job_does_not_advance() {
    let mut sim = SimBackend::seeded(SimTiming::default(), 5);
    assert_eq!(sim.advance("job_missing", Utc::now()), None);
    assert!(sim.get_job("job_missing").is_none());
}

#[test]
fn failure_rate_is_roughly_twelve_percent() {
    let mut sim = SimBackend::seeded(SimTiming::default(), 42);
    let total = 2000;
    let failed = (0..total)
        .filter(|_| sim.create_job(&request(), Utc::now()).1.resolution == Resolution::Fail)
        .count();

    let rate = failed as f64 / total as f64;
    assert!((0.09..=0.15).contains(&rate), "rate {rate}");
}

#[test]
fn latency_ranges_are_ordered() {
    for op in [
        SimOp::Health,
        SimOp::CreateDocset,
        SimOp::UploadTemplate,
        SimOp::CreateJob,
        SimOp::GetJob,
        SimOp::Download,
    ] {
        let (lo, hi) = op.range_ms();
        assert!(lo < hi);
    }
    assert_eq!(SimOp::GetJob.range_ms(), (220, 440));
}

#[tokio::test]
async fn unknown_job_is_a_404() {
    let gw = quiet_simulator(0.0, 6);
    let err = gw.get_job("job_nope").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.status(), Some(404));

    let err = gw.download_output("job_nope", 0).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn scheduled_job_resolves_on_its_own() {
    let gw = quiet_simulator(0.0, 7);
    let created = gw.create_job(&request()).await.unwrap();
    let plan = gw.backend().lock().await.plan(&created.job_id).unwrap();

    // output does not exist yet
    let err = gw.download_output(&created.job_id, 0).await.unwrap_err();
    assert!(err.is_not_found());

    tokio::time::sleep(plan.start_after + Duration::from_millis(1)).await;
    assert_eq!(gw.get_job(&created.job_id).await.unwrap().status, JobStatus::Running);

    tokio::time::sleep(plan.resolve_after).await;
    let snap = gw.get_job(&created.job_id).await.unwrap();
    assert_eq!(snap.status, JobStatus::Succeeded);

    let body = gw.download_output(&created.job_id, 0).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with(&format!("Mock file for {}\nGenerated at ", created.job_id)));

    assert!(gw.download_output(&created.job_id, 1).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn uploads_report_file_metadata() {
    let gw = quiet_simulator(0.0, 8);
    let ds = gw
        .create_document_set(
            vec![
                UploadFile::new("a.md", "# a"),
                UploadFile::new("b.txt", "bbbb"),
            ],
            Some("docs".to_string()),
        )
        .await
        .unwrap();
    let sizes: Vec<(String, u64)> = ds.files.iter().map(|f| (f.name.clone(), f.size)).collect();
    assert_eq!(sizes, vec![("a.md".to_string(), 3), ("b.txt".to_string(), 4)]);
    assert!(ds.created_at.is_some());

    let tp = gw
        .upload_template(UploadFile::new("t.xlsx", vec![1u8; 16]), Some("Quarterly".to_string()))
        .await
        .unwrap();
    assert_eq!(tp.name.as_deref(), Some("Quarterly"));
    assert_eq!(tp.size, Some(16));

    let health = gw.health().await.unwrap();
    assert_eq!(health["ok"], true);
}
