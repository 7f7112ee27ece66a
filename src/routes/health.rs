use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::response::StatusCounts;
use crate::services::scheduler::SchedulingPolicy;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub policy: SchedulingPolicy,
    pub remover: String,
    pub jobs: StatusCounts,
}

/// GET /health: liveness plus a snapshot of the session queue.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        policy: state.orchestrator.policy(),
        remover: state.orchestrator.remover_name().to_string(),
        jobs: state.store.status_counts(),
    })
}
