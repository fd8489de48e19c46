//! HTTP/WebSocket boundary (C9, `spec.md` §6).
//!
//! | Method & path                          | Handler                          |
//! |-----------------------------------------|-----------------------------------|
//! | `POST   /api/uploads`                   | [`upload_routes::upload_file`]    |
//! | `GET    /api/uploads/:id/sample`        | [`upload_routes::sample_upload`]  |
//! | `GET    /api/projections`               | [`projection_routes::list_projections`] |
//! | `GET    /api/projections/:code`         | [`projection_routes::get_projection`] |
//! | `POST   /api/routing/jobs`               | [`routing_routes::submit_job`]    |
//! | `GET    /api/routing/jobs`               | [`routing_routes::list_jobs`]     |
//! | `GET    /api/routing/jobs/:id`           | [`routing_routes::get_job`]       |
//! | `GET    /api/routing/jobs/:id/results`   | [`routing_routes::get_results`]   |
//! | `GET    /api/routing/jobs/:id/export`    | [`routing_routes::get_export`]    |
//! | `GET    /api/routing/jobs/:id/metadata`  | [`routing_routes::get_metadata`]  |
//! | `POST   /api/routing/jobs/:id/cancel`    | [`routing_routes::cancel_job`]    |
//! | `DELETE /api/routing/jobs/:id`           | [`routing_routes::cleanup_job`]   |
//! | `GET    /ws`                             | [`ws::ws_upgrade`]                |
//! | `GET    /api/health`                     | [`health_routes::health`]         |
//!
//! Middleware stack mirrors the teacher pack's `other_examples` ingestion
//! server: request tracing, permissive CORS for the companion frontend,
//! panic containment so one handler panic cannot take the process down,
//! and a body-size cap enforced ahead of the upload handler's own check.

pub mod health_routes;
pub mod projection_routes;
pub mod routing_routes;
pub mod state;
pub mod upload_routes;
pub mod ws;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/api/uploads", post(upload_routes::upload_file))
        .route("/api/uploads/:id/sample", get(upload_routes::sample_upload))
        .route(
            "/api/projections",
            get(projection_routes::list_projections),
        )
        .route("/api/projections/:code", get(projection_routes::get_projection))
        .route(
            "/api/routing/jobs",
            post(routing_routes::submit_job).get(routing_routes::list_jobs),
        )
        .route(
            "/api/routing/jobs/:id",
            get(routing_routes::get_job).delete(routing_routes::cleanup_job),
        )
        .route("/api/routing/jobs/:id/results", get(routing_routes::get_results))
        .route("/api/routing/jobs/:id/export", get(routing_routes::get_export))
        .route("/api/routing/jobs/:id/metadata", get(routing_routes::get_metadata))
        .route("/api/routing/jobs/:id/cancel", post(routing_routes::cancel_job))
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/health", get(health_routes::health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
