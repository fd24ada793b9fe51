//! Reindex endpoint.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use intent_routing::sync::{SyncMode, SyncReport};

use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct ReindexRequest {
    #[serde(default)]
    pub force_full: bool,
}

/// Reconcile the vector index with the route store.
pub async fn reindex(
    State(state): State<SharedState>,
    body: Option<Json<ReindexRequest>>,
) -> ApiResult<Json<SyncReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let mode = if request.force_full {
        SyncMode::ForcedFull
    } else {
        SyncMode::Incremental
    };

    let report = state.run_sync(mode).await?;
    Ok(Json(report))
}
