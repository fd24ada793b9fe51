//! Component readiness.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: ComponentFlags,
    pub routes_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ComponentFlags {
    pub embedder: bool,
    pub vector_index: bool,
    pub route_store: bool,
    pub llm_configured: bool,
}

pub async fn health(State(state): State<SharedState>) -> ApiResult<Json<HealthResponse>> {
    let settings = state.settings_snapshot();
    let components = state.components();

    let vector_index = components.index.healthy().await;
    let flags = ComponentFlags {
        embedder: components.embedder.dim() > 0,
        vector_index,
        route_store: true,
        llm_configured: settings
            .llm_api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false),
    };

    Ok(Json(HealthResponse {
        status: if flags.embedder && flags.vector_index {
            "ok"
        } else {
            "degraded"
        },
        components: flags,
        routes_count: state.store.len(),
    }))
}
