//! Upload endpoints (`spec.md` §6): accept a multipart file, persist it,
//! sniff its shape, and hand back the opaque descriptor the rest of the
//! API references by `fileId`.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::model::upload::UploadDescriptor;
use crate::row_iterator::RowIterator;

use super::state::AppState;

pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<UploadDescriptor>> {
    let mut file_name = "upload.csv".to_string();
    let mut bytes = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::Validation(e.to_string()))? {
        if field.name() == Some("file") {
            if let Some(name) = field.file_name() {
                file_name = name.to_string();
            }
            bytes = Some(field.bytes().await.map_err(|e| ApiError::Validation(e.to_string()))?);
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::Validation("multipart field \"file\" is required".into()))?;
    if bytes.len() > state.config.max_upload_bytes {
        return Err(ApiError::Validation(format!(
            "upload of {} bytes exceeds the {} byte limit",
            bytes.len(),
            state.config.max_upload_bytes
        )));
    }

    let descriptor = state.upload_store.store(&file_name, &bytes).await?;
    state.registry.register_upload(descriptor.clone());

    Ok(Json(descriptor))
}

#[derive(Debug, Deserialize)]
pub struct SampleQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SampleResponse {
    headers: Vec<String>,
    sample: Vec<serde_json::Map<String, serde_json::Value>>,
    total_rows: usize,
}

const DEFAULT_SAMPLE_LIMIT: usize = 10;

/// `GET /api/upload/:fileId/sample?limit=N` (`spec.md` §6) — the first `N`
/// rows of an uploaded file, read through the same `RowIterator` the
/// dispatcher uses, so the preview reflects exactly what a job would see.
pub async fn sample_upload(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Query(query): Query<SampleQuery>,
) -> ApiResult<Json<SampleResponse>> {
    let descriptor = state
        .registry
        .upload_descriptor_for_file(&file_id)
        .ok_or_else(|| ApiError::NotFound(format!("upload {file_id}")))?;
    let path = state.upload_store.resolve(&file_id)?;

    let limit = query.limit.unwrap_or(DEFAULT_SAMPLE_LIMIT);
    let mut rows = RowIterator::open(&path, &descriptor).map_err(|e| ApiError::Validation(e.to_string()))?;

    let mut sample = Vec::with_capacity(limit.min(descriptor.row_count));
    for _ in 0..limit {
        match rows.next_row() {
            Some(Ok(row)) => {
                let mut object = serde_json::Map::with_capacity(row.fields.len());
                for (k, v) in row.fields {
                    object.insert(k, serde_json::Value::String(v));
                }
                sample.push(object);
            }
            Some(Err(e)) => return Err(ApiError::Validation(e.to_string())),
            None => break,
        }
    }

    Ok(Json(SampleResponse {
        headers: descriptor.columns.clone(),
        sample,
        total_rows: descriptor.row_count,
    }))
}
