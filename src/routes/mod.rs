use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::app_state::AppState;

pub mod health;
pub mod jobs;
pub mod metrics;

/// Job API routes. `/metrics` is mounted separately by the server binary.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/jobs",
            post(jobs::upload_images)
                .get(jobs::list_jobs)
                .delete(jobs::reset_jobs),
        )
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job))
        .route("/api/v1/jobs/{job_id}/process", post(jobs::process_job))
        .route("/api/v1/jobs/{job_id}/retry", post(jobs::retry_job))
        .route("/api/v1/jobs/{job_id}/refine", post(jobs::refine_job))
        .route("/api/v1/jobs/{job_id}/source", get(jobs::get_source))
        .route("/api/v1/jobs/{job_id}/result", get(jobs::get_result))
        .route("/api/v1/jobs/{job_id}/download", get(jobs::download_job))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
}
