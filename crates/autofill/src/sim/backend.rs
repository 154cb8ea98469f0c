// In-memory model of the document-filling service: a job repository keyed
// by id whose state only moves through `advance`. Timing and the outcome of
// each job are rolled once, at creation, so the state machine itself can be
// driven step by step without timers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use uuid::Uuid;

use crate::config::API_PREFIX;
use crate::gateway::types::{CreateJobRequest, DocsetCreated, JobCreated, TemplateUploaded};
use crate::jobs::model::{FileMeta, JobFailure, JobOutput, JobSnapshot, JobStatus};

pub const FAILURE_CODE: &str = "MODEL_ERROR";
pub const RUNNING_STAGE: &str = "calling_model";

#[derive(Debug, Clone)]
pub struct SimTiming {
    /// queued -> running, inclusive milliseconds
    pub queue_ms: (u64, u64),
    /// running -> resolved, inclusive milliseconds
    pub run_ms: (u64, u64),
    pub failure_rate: f64,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            queue_ms: (800, 1600),
            run_ms: (4500, 10500),
            failure_rate: 0.12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Succeed,
    Fail,
}

/// Pre-rolled schedule for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPlan {
    pub start_after: Duration,
    pub resolve_after: Duration,
    pub resolution: Resolution,
}

#[derive(Debug, Clone)]
struct SimJob {
    snapshot: JobSnapshot,
    plan: JobPlan,
    request: CreateJobRequest,
}

pub struct SimBackend {
    docsets: HashMap<String, DocsetCreated>,
    templates: HashMap<String, TemplateUploaded>,
    jobs: HashMap<String, SimJob>,
    timing: SimTiming,
    rng: StdRng,
}

fn sim_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..12])
}

impl SimBackend {
    pub fn new(timing: SimTiming) -> Self {
        Self::with_rng(timing, StdRng::from_entropy())
    }

    pub fn seeded(timing: SimTiming, seed: u64) -> Self {
        Self::with_rng(timing, StdRng::seed_from_u64(seed))
    }

    fn with_rng(timing: SimTiming, rng: StdRng) -> Self {
        Self {
            docsets: HashMap::new(),
            templates: HashMap::new(),
            jobs: HashMap::new(),
            timing,
            rng,
        }
    }

    pub fn create_docset(
        &mut self,
        files: Vec<FileMeta>,
        name: Option<String>,
        now: DateTime<Utc>,
    ) -> DocsetCreated {
        let docset = DocsetCreated {
            docset_id: sim_id("ds"),
            files,
            created_at: Some(now),
        };
        tracing::debug!(docset_id = %docset.docset_id, name = ?name, files = docset.files.len(), "sim: docset created");
        self.docsets.insert(docset.docset_id.clone(), docset.clone());
        docset
    }

    pub fn upload_template(&mut self, file: FileMeta, name: Option<String>) -> TemplateUploaded {
        let template = TemplateUploaded {
            template_id: sim_id("tp"),
            name: Some(name.unwrap_or(file.name)),
            size: Some(file.size),
        };
        self.templates
            .insert(template.template_id.clone(), template.clone());
        template
    }

    pub fn docset_count(&self) -> usize {
        self.docsets.len()
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Register a queued job and roll its plan.
    pub fn create_job(
        &mut self,
        request: &CreateJobRequest,
        now: DateTime<Utc>,
    ) -> (JobCreated, JobPlan) {
        let job_id = sim_id("job");
        let plan = JobPlan {
            start_after: self.roll_ms(self.timing.queue_ms),
            resolve_after: self.roll_ms(self.timing.run_ms),
            resolution: if self.rng.gen_bool(self.timing.failure_rate.clamp(0.0, 1.0)) {
                Resolution::Fail
            } else {
                Resolution::Succeed
            },
        };

        let snapshot = JobSnapshot {
            job_id: job_id.clone(),
            status: JobStatus::Queued,
            stage: Some("uploading".to_string()),
            outputs: Vec::new(),
            error: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.jobs.insert(
            job_id.clone(),
            SimJob {
                snapshot,
                plan,
                request: request.clone(),
            },
        );

        (
            JobCreated {
                job_id,
                status: Some(JobStatus::Queued),
            },
            plan,
        )
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobSnapshot> {
        self.jobs.get(job_id).map(|j| j.snapshot.clone())
    }

    pub fn plan(&self, job_id: &str) -> Option<JobPlan> {
        self.jobs.get(job_id).map(|j| j.plan)
    }

    /// The request body the job was created from.
    pub fn request(&self, job_id: &str) -> Option<&CreateJobRequest> {
        self.jobs.get(job_id).map(|j| &j.request)
    }

    pub fn output(&self, job_id: &str, index: usize) -> Option<JobOutput> {
        self.jobs
            .get(job_id)
            .and_then(|j| j.snapshot.outputs.get(index).cloned())
    }

    /// Move a job one step forward: queued -> running -> resolved.
    /// Terminal jobs are left untouched. Returns the status after the step,
    /// or `None` for an unknown id.
    pub fn advance(&mut self, job_id: &str, now: DateTime<Utc>) -> Option<JobStatus> {
        let suffix: u16 = self.rng.gen();
        let job = self.jobs.get_mut(job_id)?;
        let snap = &mut job.snapshot;

        match snap.status {
            JobStatus::Queued => {
                snap.status = JobStatus::Running;
                snap.stage = Some(RUNNING_STAGE.to_string());
            }
            JobStatus::Running => match job.plan.resolution {
                Resolution::Fail => {
                    snap.status = JobStatus::Failed;
                    snap.stage = Some(RUNNING_STAGE.to_string());
                    snap.outputs = Vec::new();
                    snap.error = Some(JobFailure {
                        code: FAILURE_CODE.to_string(),
                        message: "Upstream failure (simulated)".to_string(),
                        detail: json!({ "hint": "Retry creates a new job" }),
                    });
                }
                Resolution::Succeed => {
                    snap.status = JobStatus::Succeeded;
                    snap.stage = Some("done".to_string());
                    snap.outputs = vec![JobOutput {
                        filename: format!("filled_{}_{suffix:04x}.xlsx", now.timestamp_millis()),
                        download_url: format!("{API_PREFIX}/jobs/{job_id}/files/0"),
                    }];
                    snap.error = None;
                }
            },
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled => {
                return Some(snap.status);
            }
        }

        snap.updated_at = Some(now);
        Some(snap.status)
    }

    fn roll_ms(&mut self, (lo, hi): (u64, u64)) -> Duration {
        Duration::from_millis(self.rng.gen_range(lo..=hi.max(lo)))
    }
}
