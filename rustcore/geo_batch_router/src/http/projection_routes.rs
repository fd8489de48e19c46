//! Coordinate reference system catalog endpoints (`spec.md` §6).

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::catalog;
use crate::error::{ApiError, ApiResult};
use crate::model::reference::ReferenceDescriptor;

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    region: Option<String>,
    search: Option<String>,
}

pub async fn list_projections(
    State(_state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<ReferenceDescriptor>> {
    Json(catalog::list(query.region.as_deref(), query.search.as_deref()))
}

pub async fn get_projection(
    State(_state): State<AppState>,
    axum::extract::Path(code): axum::extract::Path<String>,
) -> ApiResult<Json<ReferenceDescriptor>> {
    catalog::find(&code)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("reference system {code}")))
}
