// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use autofill::context::AppContext;
use autofill::gateway::{
    CreateJobRequest, DocsetCreated, Gateway, GatewayError, JobCreated, SimulatedGateway,
    TemplateUploaded, UploadFile,
};
use autofill::jobs::{JobFailure, JobOutput, JobSnapshot, JobStatus, JobStore};
use autofill::sim::{NoLatency, SimBackend, SimTiming};
use autofill::Config;
use bytes::Bytes;
use serde_json::{json, Value};

/// One canned answer to `get_job`.
#[derive(Clone, Debug)]
pub enum Reply {
    Snapshot(JobSnapshot),
    Status(u16),
}

/// Gateway that answers `get_job` from a per-job script and records every
/// fetch with its (possibly paused) tokio timestamp. The last reply of a
/// script repeats forever.
#[derive(Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    fetches: Mutex<Vec<(String, tokio::time::Instant)>>,
    created: AtomicUsize,
    requests: Mutex<Vec<CreateJobRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, job_id: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(job_id.to_string(), replies.into());
    }

    pub fn fetches(&self) -> Vec<(String, tokio::time::Instant)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetched_ids(&self) -> Vec<String> {
        self.fetches().into_iter().map(|(id, _)| id).collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CreateJobRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn health(&self) -> Result<Value, GatewayError> {
        Ok(json!({ "ok": true }))
    }

    async fn create_document_set(
        &self,
        files: Vec<UploadFile>,
        _name: Option<String>,
    ) -> Result<DocsetCreated, GatewayError> {
        Ok(DocsetCreated {
            docset_id: "ds_1".to_string(),
            files: files.iter().map(UploadFile::meta).collect(),
            created_at: None,
        })
    }

    async fn upload_template(
        &self,
        file: UploadFile,
        name: Option<String>,
    ) -> Result<TemplateUploaded, GatewayError> {
        Ok(TemplateUploaded {
            template_id: "tp_1".to_string(),
            name: Some(name.unwrap_or(file.name)),
            size: Some(file.data.len() as u64),
        })
    }

    async fn create_job(&self, request: &CreateJobRequest) -> Result<JobCreated, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JobCreated {
            job_id: format!("job_{n}"),
            status: Some(JobStatus::Queued),
        })
    }

    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, GatewayError> {
        self.fetches
            .lock()
            .unwrap()
            .push((job_id.to_string(), tokio::time::Instant::now()));

        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(job_id) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Snapshot(s)) => Ok(s),
            Some(Reply::Status(status)) => Err(GatewayError::Status {
                status,
                message: format!("HTTP {status}"),
            }),
            None => Err(GatewayError::not_found(format!("no script for {job_id}"))),
        }
    }

    async fn download_output(&self, job_id: &str, index: usize) -> Result<Bytes, GatewayError> {
        Ok(Bytes::from(format!("{job_id}:{index}")))
    }
}

pub fn snapshot(job_id: &str, status: JobStatus) -> JobSnapshot {
    let outputs = if status == JobStatus::Succeeded {
        vec![JobOutput {
            filename: format!("filled_{job_id}.xlsx"),
            download_url: format!("/api/v1/jobs/{job_id}/files/0"),
        }]
    } else {
        Vec::new()
    };
    let error = (status == JobStatus::Failed).then(|| JobFailure {
        code: "MODEL_ERROR".to_string(),
        message: "Upstream failure".to_string(),
        detail: json!({ "hint": "Retry creates a new job" }),
    });

    JobSnapshot {
        job_id: job_id.to_string(),
        status,
        stage: Some(status.as_str().to_string()),
        outputs,
        error,
        created_at: None,
        updated_at: None,
    }
}

pub fn reply(job_id: &str, status: JobStatus) -> Reply {
    Reply::Snapshot(snapshot(job_id, status))
}

pub fn context_with(gateway: Arc<dyn Gateway>) -> AppContext {
    AppContext::with_parts(Config::default(), JobStore::in_memory(), gateway)
}

/// Simulator without call latency and a fixed seed.
pub fn quiet_simulator(failure_rate: f64, seed: u64) -> SimulatedGateway {
    let timing = SimTiming {
        failure_rate,
        ..SimTiming::default()
    };
    SimulatedGateway::with_parts(SimBackend::seeded(timing, seed), Arc::new(NoLatency))
}
