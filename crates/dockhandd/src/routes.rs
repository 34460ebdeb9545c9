use crate::error::ApiError;
use crate::multipart::BuildForm;
use crate::state::AppState;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use dockhand_core::{JobDescriptor, assemble};
use dockhand_jobs::{JobError, JobId, JobStatusView};
use serde::Serialize;
use serde_json::json;

pub const QUEUED_STATUS: &str = "Sent to processing queue";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: JobId,
    pub image_reference: String,
    pub status: &'static str,
    pub data: SubmitSummary,
}

/// What was accepted, without echoing file contents or the password.
#[derive(Debug, Serialize)]
pub struct SubmitSummary {
    pub tag: String,
    pub dockerfile_bytes: usize,
    pub optional_files: Vec<String>,
    pub authenticated: bool,
}

impl SubmitSummary {
    fn of(descriptor: &JobDescriptor) -> Self {
        Self {
            tag: descriptor.tag().to_string(),
            dockerfile_bytes: descriptor.dockerfile().len(),
            optional_files: descriptor.auxiliary_files().keys().cloned().collect(),
            authenticated: descriptor.registry_credential().is_some(),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/build", post(submit_build))
        .route("/status/{task_id}", get(job_status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    (
        StatusCode::IM_A_TEAPOT,
        Json(json!({
            "message": "dockhand builds and publishes Docker images. POST /build, then poll GET /status/{task_id}."
        })),
    )
}

async fn submit_build(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let (request, dockerfile, optional_files) = BuildForm::read(multipart).await?.into_parts()?;
    let descriptor = assemble(request, dockerfile, optional_files)?;

    let image_reference = descriptor.image_reference();
    let data = SubmitSummary::of(&descriptor);
    let task_id = state.queue.enqueue(descriptor).await?;

    tracing::info!(job_id = %task_id, "Accepted build of {}", image_reference);
    Ok(Json(SubmitResponse {
        task_id,
        image_reference,
        status: QUEUED_STATUS,
        data,
    }))
}

async fn job_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    let id: JobId = task_id
        .parse()
        .map_err(|_| JobError::UnknownJob(task_id.clone()))?;
    Ok(Json(state.queue.query(&id).await?))
}
