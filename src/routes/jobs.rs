use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{ImagePayload, JobAction};
use crate::models::response::{IngestResponse, JobView};
use crate::services::download::{self, DownloadError};
use crate::services::ingest::{self, RawFile};
use crate::services::store::StoreError;

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Busy(_) | StoreError::NoResult(_) | StoreError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
    }
}

/// POST /api/v1/jobs: Upload one or more images.
pub async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestResponse>), StatusCode> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!(error = %e, "Malformed multipart upload");
        StatusCode::BAD_REQUEST
    })? {
        // Plain form fields carry no file name and are ignored.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let declared_mime = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        files.push(RawFile::from_bytes(file_name, declared_mime, data));
    }

    if files.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let report = ingest::ingest(&state.store, files).await;
    let skipped = report.skipped();
    let accepted = report.accepted.iter().map(JobView::from).collect();

    Ok((StatusCode::CREATED, Json(IngestResponse { accepted, skipped })))
}

/// GET /api/v1/jobs: All jobs in upload order.
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobView>> {
    Json(state.store.all().iter().map(JobView::from).collect())
}

/// DELETE /api/v1/jobs: Reset the session.
pub async fn reset_jobs(State(state): State<AppState>) -> StatusCode {
    let removed = state.store.clear();
    tracing::info!(removed, "Session reset");
    StatusCode::NO_CONTENT
}

/// GET /api/v1/jobs/{job_id}: Current state of one job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobView>, StatusCode> {
    state
        .store
        .get(job_id)
        .map(|job| Json(JobView::from(&job)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn act(
    state: AppState,
    job_id: Uuid,
    action: JobAction,
) -> Result<(StatusCode, Json<JobView>), StatusCode> {
    let job = state.orchestrator.trigger(job_id, action).map_err(|e| {
        tracing::debug!(job_id = %job_id, action = %action, error = %e, "Action rejected");
        store_status(&e)
    })?;
    Ok((StatusCode::ACCEPTED, Json(JobView::from(&job))))
}

/// POST /api/v1/jobs/{job_id}/process
pub async fn process_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobView>), StatusCode> {
    act(state, job_id, JobAction::Process).await
}

/// POST /api/v1/jobs/{job_id}/retry: Start over from the uploaded source.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobView>), StatusCode> {
    act(state, job_id, JobAction::Retry).await
}

/// POST /api/v1/jobs/{job_id}/refine: Run removal again on the last result.
pub async fn refine_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobView>), StatusCode> {
    act(state, job_id, JobAction::Refine).await
}

fn image_response(payload: &ImagePayload) -> Response {
    raw_image(payload.mime_type(), payload.bytes().clone())
}

fn raw_image(mime_type: &str, bytes: Bytes) -> Response {
    let content_type = HeaderValue::from_str(mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
}

/// GET /api/v1/jobs/{job_id}/source
pub async fn get_source(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, StatusCode> {
    let job = state.store.get(job_id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(image_response(job.source()))
}

/// GET /api/v1/jobs/{job_id}/result: Latest result, even while a refinement runs.
pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, StatusCode> {
    let job = state.store.get(job_id).ok_or(StatusCode::NOT_FOUND)?;
    job.result().map(image_response).ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/v1/jobs/{job_id}/download: Current result as an attachment.
pub async fn download_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, StatusCode> {
    let artifact = download::prepare(&state.store, job_id, &state.download_prefix).map_err(
        |e| match e {
            DownloadError::NotFound(_) => StatusCode::NOT_FOUND,
            DownloadError::NotReady { .. } => StatusCode::CONFLICT,
        },
    )?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        artifact.file_name.replace(['"', '\\'], "_")
    );
    let mut response = raw_image(&artifact.mime_type, artifact.bytes);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
