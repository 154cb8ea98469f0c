use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{Config, API_KEY_HEADER, API_PREFIX};
use crate::gateway::error::{message_from_body, GatewayError};
use crate::gateway::types::{CreateJobRequest, DocsetCreated, JobCreated, TemplateUploaded, UploadFile};
use crate::gateway::Gateway;
use crate::jobs::model::JobSnapshot;

/// Gateway backed by the remote service.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpGateway {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(cfg.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn with_key(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header(API_KEY_HEADER, key),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, GatewayError> {
        let res = self.with_key(req).send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            status: status.as_u16(),
            message: message_from_body(status.as_u16(), &body),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, GatewayError> {
        let res = self.send(req).await?;
        let bytes = res.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn file_part(file: UploadFile) -> Result<Part, GatewayError> {
    let part = Part::bytes(file.data.to_vec()).file_name(file.name);
    match file.content_type {
        Some(mime) => Ok(part.mime_str(&mime)?),
        None => Ok(part),
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn health(&self) -> Result<Value, GatewayError> {
        self.send_json(self.client.get(self.url("/health"))).await
    }

    async fn create_document_set(
        &self,
        files: Vec<UploadFile>,
        name: Option<String>,
    ) -> Result<DocsetCreated, GatewayError> {
        let mut form = Form::new();
        for file in files {
            form = form.part("files[]", file_part(file)?);
        }
        if let Some(name) = name {
            form = form.text("name", name);
        }
        self.send_json(self.client.post(self.url("/docsets")).multipart(form))
            .await
    }

    async fn upload_template(
        &self,
        file: UploadFile,
        name: Option<String>,
    ) -> Result<TemplateUploaded, GatewayError> {
        let mut form = Form::new().part("file", file_part(file)?);
        if let Some(name) = name {
            form = form.text("name", name);
        }
        self.send_json(self.client.post(self.url("/templates")).multipart(form))
            .await
    }

    async fn create_job(&self, request: &CreateJobRequest) -> Result<JobCreated, GatewayError> {
        self.send_json(self.client.post(self.url("/jobs/fill-template")).json(request))
            .await
    }

    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, GatewayError> {
        self.send_json(self.client.get(self.url(&format!("/jobs/{job_id}"))))
            .await
    }

    async fn download_output(&self, job_id: &str, index: usize) -> Result<Bytes, GatewayError> {
        let res = self
            .send(self.client.get(self.url(&format!("/jobs/{job_id}/files/{index}"))))
            .await?;
        Ok(res.bytes().await?)
    }
}
