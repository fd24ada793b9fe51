//! Runtime settings endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ApiResult;
use crate::state::SharedState;

pub async fn read(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let view = state.settings_snapshot().public_view()?;
    Ok(Json(view))
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub updated: Vec<String>,
    pub settings: Value,
}

/// Apply a settings patch. Changed keys trigger component rebind; an
/// embedding dimension change forces a full reindex.
pub async fn update(
    State(state): State<SharedState>,
    Json(patch): Json<Map<String, Value>>,
) -> ApiResult<Json<UpdateResponse>> {
    let updated = state.apply_settings(&patch).await?;
    let settings = state.settings_snapshot().public_view()?;
    Ok(Json(UpdateResponse { updated, settings }))
}
