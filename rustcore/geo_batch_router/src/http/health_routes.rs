//! Liveness endpoint (`spec.md` §6 `GET /api/health`). Reports live job
//! count and process uptime alongside the bare `{status: "ok"}` the spec
//! requires (`SPEC_FULL.md` §6, "ambient — operational visibility").

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    live_jobs: usize,
    uptime_seconds: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        live_jobs: state.registry.list_snapshots().len(),
        uptime_seconds: state.uptime_seconds(),
    })
}
