use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::models::JobListItem;
use crate::context::AppContext;
use crate::jobs::model::{JobRecord, JobStatus};
use crate::jobs::submit;

pub mod models;

#[derive(Clone)]
pub struct ApiState {
    pub ctx: AppContext,
}

/// Read-mostly view of the local job registry for whatever renders it.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/explain", get(explain_job))
        .route("/jobs/:id/refresh", post(refresh_job))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub items: Vec<JobListItem>,
    pub active: usize,
    pub now_utc: DateTime<Utc>,
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(q): Query<ListJobsQuery>,
) -> Json<ListJobsResponse> {
    let limit = q.limit.unwrap_or(100).clamp(1, 500);
    let records = state.ctx.store.list().await;
    let active = records.iter().filter(|r| r.status.is_active()).count();

    let items = records
        .iter()
        .filter(|r| q.status.map_or(true, |s| r.status == s))
        .take(limit)
        .map(JobListItem::from)
        .collect();

    Json(ListJobsResponse {
        items,
        active,
        now_utc: Utc::now(),
    })
}

pub async fn get_job(Path(id): Path<String>, State(state): State<ApiState>) -> Response {
    match state.ctx.store.get(&id).await {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "job not found"),
    }
}

pub async fn refresh_job(Path(id): Path<String>, State(state): State<ApiState>) -> Response {
    if state.ctx.store.get(&id).await.is_none() {
        return error_response(StatusCode::NOT_FOUND, "job not found");
    }
    match submit::refresh(&state.ctx, &id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, format!("refresh failed: {e}")),
    }
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub stage: Option<String>,
    pub summary: String,
    pub error_code: Option<String>,
    pub hint: Option<String>,
}

pub fn summarize(record: &JobRecord) -> String {
    match record.status {
        JobStatus::Queued => "Queued and waiting to run.".to_string(),
        JobStatus::Running => format!(
            "Running ({}).",
            record.stage.as_deref().unwrap_or("working")
        ),
        JobStatus::Succeeded => match record.outputs.first() {
            Some(out) => format!("Succeeded. Output: {}.", out.filename),
            None => "Succeeded.".to_string(),
        },
        JobStatus::Failed => format!(
            "Failed: {}. Retrying creates a new job.",
            record
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or("unknown error")
        ),
        JobStatus::Canceled => "Canceled.".to_string(),
    }
}

pub async fn explain_job(Path(id): Path<String>, State(state): State<ApiState>) -> Response {
    let Some(record) = state.ctx.store.get(&id).await else {
        return error_response(StatusCode::NOT_FOUND, "job not found");
    };

    let hint = record
        .error
        .as_ref()
        .and_then(|e| e.detail.get("hint"))
        .and_then(|h| h.as_str())
        .map(str::to_string);

    (
        StatusCode::OK,
        Json(ExplainResponse {
            summary: summarize(&record),
            error_code: record.error.as_ref().map(|e| e.code.clone()),
            job_id: record.job_id,
            status: record.status,
            stage: record.stage,
            hint,
        }),
    )
        .into_response()
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
