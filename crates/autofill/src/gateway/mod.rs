use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::config::Config;
use crate::jobs::model::JobSnapshot;

pub mod error;
pub mod http;
pub mod simulated;
pub mod types;

pub use error::GatewayError;
pub use http::HttpGateway;
pub use simulated::SimulatedGateway;
pub use types::{
    CreateJobRequest, DocsetCreated, JobCreated, JobMode, MemoryLimit, ModelOptions,
    ReasoningEffort, TemplateUploaded, UploadFile,
};

/// The backend as seen by the client. Callers hold an `Arc<dyn Gateway>`
/// and never know whether the network or the simulator is behind it.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn health(&self) -> Result<Value, GatewayError>;

    async fn create_document_set(
        &self,
        files: Vec<UploadFile>,
        name: Option<String>,
    ) -> Result<DocsetCreated, GatewayError>;

    async fn upload_template(
        &self,
        file: UploadFile,
        name: Option<String>,
    ) -> Result<TemplateUploaded, GatewayError>;

    async fn create_job(&self, request: &CreateJobRequest) -> Result<JobCreated, GatewayError>;

    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, GatewayError>;

    async fn download_output(&self, job_id: &str, index: usize) -> Result<Bytes, GatewayError>;
}

pub fn build_gateway(cfg: &Config) -> anyhow::Result<Arc<dyn Gateway>> {
    if cfg.use_mock {
        tracing::info!("using simulated backend");
        Ok(Arc::new(SimulatedGateway::new()))
    } else {
        tracing::info!(base_url = %cfg.base_url, api_key = cfg.api_key.is_some(), "using remote backend");
        Ok(Arc::new(HttpGateway::new(cfg)?))
    }
}
