//! Batch routing job endpoints (`spec.md` §4.6, §4.7, §6) — submit,
//! poll status, stream results, fetch metadata, cancel, and clean up.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::dispatcher;
use crate::error::{ApiError, ApiResult};
use crate::model::job::JobSnapshot;
use crate::model::routing_config::RoutingConfiguration;

use super::state::AppState;

/// The JSON shape returned by `GET /api/routing/jobs/:id/results` (`spec.md`
/// §6: `{success, data: BatchResult}`). Read back from the completed job's
/// GeoJSON file — failed rows leave no feature behind, so only the job's
/// aggregate counts carry their contribution to this response.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub job_id: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub features: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct BatchResultEnvelope {
    pub success: bool,
    pub data: BatchResult,
}

pub async fn submit_job(
    State(state): State<AppState>,
    Json(configuration): Json<RoutingConfiguration>,
) -> ApiResult<(StatusCode, Json<JobSnapshot>)> {
    let upload = state
        .registry
        .upload_descriptor_for_file(&configuration.file_id)
        .ok_or_else(|| ApiError::Validation(format!("unknown upload {:?}", configuration.file_id)))?;

    dispatcher::validate_submission(&configuration, &upload)?;

    let job_id = state.registry.create(configuration, upload.row_count, &state.config.results_dir);

    tokio::spawn(dispatcher::run(
        job_id.clone(),
        state.registry.clone(),
        state.broadcaster.clone(),
        state.routing_client.clone(),
        state.upload_store.clone(),
        state.config.batch_size,
        state.config.osrm_max_concurrent,
    ));

    let snapshot = state
        .registry
        .snapshot(&job_id)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("job disappeared immediately after creation")))?;

    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.registry.list_snapshots())
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<JobSnapshot>> {
    state
        .registry
        .snapshot(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))
}

/// `spec.md` §4.7 "Cancel": idempotent — cancelling a job already in a
/// terminal state (or already cancelled) is a no-op, not an error. Only a
/// genuinely unknown job id is a 404.
pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<StatusCode> {
    if state.registry.get(&job_id).is_none() {
        return Err(ApiError::NotFound(format!("job {job_id}")));
    }
    if state.registry.cancel(&job_id) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Ok(StatusCode::OK)
    }
}

/// Deletes a job's bookkeeping entry and its on-disk artifacts
/// (`spec.md` §4.7 "Cleanup"). Only terminal jobs may be cleaned up — a
/// running job must be cancelled first.
pub async fn cleanup_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<StatusCode> {
    let snapshot = state.registry.snapshot(&job_id).ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;
    if !snapshot.status.is_terminal() {
        return Err(ApiError::Precondition(format!("job {job_id} is still {:?}", snapshot.status)));
    }

    let job = state.registry.get(&job_id).ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;
    let (result_path, metadata_path) = {
        let guard = job.read();
        (guard.result_path.clone(), guard.metadata_path.clone())
    };

    state.registry.evict(&job_id);
    let _ = tokio::fs::remove_file(&result_path).await;
    let _ = tokio::fs::remove_file(&metadata_path).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_metadata(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    let job = state.registry.get(&job_id).ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;
    let metadata_path = job.read().metadata_path.clone();
    stream_file(&metadata_path, "application/json").await
}

/// Returns the job's outcomes as JSON (`spec.md` §6 `GET
/// /api/routing/jobs/:id/results`: `{success, data: BatchResult}`). Reads
/// the completed job's GeoJSON file back and folds its `features` array in
/// alongside the job's aggregate counts; individual failed rows are never
/// persisted as features, so only their count contributes here.
pub async fn get_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<BatchResultEnvelope>> {
    let job = state.registry.get(&job_id).ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;
    let (status, result_path, progress) = {
        let guard = job.read();
        (guard.status, guard.result_path.clone(), guard.progress)
    };
    if status != crate::model::job::JobStatus::Completed {
        return Err(ApiError::Precondition("Job not completed yet".to_string()));
    }

    let contents = tokio::fs::read(&result_path)
        .await
        .map_err(|_| ApiError::NotFound(format!("{}", result_path.display())))?;
    let parsed: serde_json::Value = serde_json::from_slice(&contents).map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    let features = parsed.get("features").and_then(|f| f.as_array()).cloned().unwrap_or_default();

    Ok(Json(BatchResultEnvelope {
        success: true,
        data: BatchResult {
            job_id,
            total: progress.total,
            successful: progress.successful,
            failed: progress.failed,
            features,
        },
    }))
}

/// Streams the job's GeoJSON result file without ever buffering it whole
/// in memory (`spec.md` §4.5, §6 `GET /api/routing/jobs/:id/export`,
/// mirroring the writer's own streaming discipline on the way out).
pub async fn get_export(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    let job = state.registry.get(&job_id).ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;
    let (status, result_path) = {
        let guard = job.read();
        (guard.status, guard.result_path.clone())
    };
    if status != crate::model::job::JobStatus::Completed {
        return Err(ApiError::Precondition("Job not completed yet".to_string()));
    }
    stream_file(&result_path, "application/geo+json").await
}

async fn stream_file(path: &std::path::Path, content_type: &'static str) -> ApiResult<Response> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|_| ApiError::NotFound(format!("{}", path.display())))?;
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response())
}
