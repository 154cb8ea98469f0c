use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::gateway::error::GatewayError;
use crate::gateway::types::{CreateJobRequest, DocsetCreated, JobCreated, TemplateUploaded, UploadFile};
use crate::gateway::Gateway;
use crate::jobs::model::JobSnapshot;
use crate::sim::{JobPlan, LatencyModel, RandomLatency, SimBackend, SimOp, SimTiming};

/// Gateway backed by the in-memory simulator. Every call sleeps for its own
/// latency draw; job transitions are driven by a per-job scheduler task.
#[derive(Clone)]
pub struct SimulatedGateway {
    backend: Arc<Mutex<SimBackend>>,
    latency: Arc<dyn LatencyModel>,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::with_parts(SimBackend::new(SimTiming::default()), Arc::new(RandomLatency))
    }

    pub fn with_parts(backend: SimBackend, latency: Arc<dyn LatencyModel>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            latency,
        }
    }

    /// Shared handle to the simulator state.
    pub fn backend(&self) -> Arc<Mutex<SimBackend>> {
        self.backend.clone()
    }

    async fn pause(&self, op: SimOp) {
        let delay = self.latency.delay(op);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn schedule(&self, job_id: String, plan: JobPlan) {
        let backend = self.backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(plan.start_after).await;
            let status = backend.lock().await.advance(&job_id, Utc::now());
            tracing::debug!(job_id = %job_id, ?status, "sim: job started");

            tokio::time::sleep(plan.resolve_after).await;
            let status = backend.lock().await.advance(&job_id, Utc::now());
            tracing::debug!(job_id = %job_id, ?status, "sim: job resolved");
        });
    }
}

fn job_not_found(job_id: &str) -> GatewayError {
    GatewayError::not_found(format!("job not found (simulated): {job_id}"))
}

#[async_trait]
impl Gateway for SimulatedGateway {
    async fn health(&self) -> Result<Value, GatewayError> {
        self.pause(SimOp::Health).await;
        Ok(json!({ "ok": true, "time": Utc::now().timestamp_millis() }))
    }

    async fn create_document_set(
        &self,
        files: Vec<UploadFile>,
        name: Option<String>,
    ) -> Result<DocsetCreated, GatewayError> {
        self.pause(SimOp::CreateDocset).await;
        let metas = files.iter().map(UploadFile::meta).collect();
        Ok(self
            .backend
            .lock()
            .await
            .create_docset(metas, name, Utc::now()))
    }

    async fn upload_template(
        &self,
        file: UploadFile,
        name: Option<String>,
    ) -> Result<TemplateUploaded, GatewayError> {
        self.pause(SimOp::UploadTemplate).await;
        Ok(self.backend.lock().await.upload_template(file.meta(), name))
    }

    async fn create_job(&self, request: &CreateJobRequest) -> Result<JobCreated, GatewayError> {
        self.pause(SimOp::CreateJob).await;
        let (created, plan) = self.backend.lock().await.create_job(request, Utc::now());
        self.schedule(created.job_id.clone(), plan);
        Ok(created)
    }

    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, GatewayError> {
        self.pause(SimOp::GetJob).await;
        self.backend
            .lock()
            .await
            .get_job(job_id)
            .ok_or_else(|| job_not_found(job_id))
    }

    async fn download_output(&self, job_id: &str, index: usize) -> Result<Bytes, GatewayError> {
        self.pause(SimOp::Download).await;
        let backend = self.backend.lock().await;
        if backend.get_job(job_id).is_none() {
            return Err(job_not_found(job_id));
        }
        if backend.output(job_id, index).is_none() {
            return Err(GatewayError::not_found(format!(
                "output {index} not found (simulated): {job_id}"
            )));
        }

        let content = format!(
            "Mock file for {job_id}\nGenerated at {}\n",
            Utc::now().to_rfc3339()
        );
        Ok(Bytes::from(content))
    }
}
