//! Route CRUD and LLM-backed utterance generation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use intent_core::AppError;
use intent_llm::RouteContext;
use intent_routing::types::{default_negative_threshold, default_score_threshold};
use intent_routing::Route;

use crate::error::ApiResult;
use crate::state::SharedState;

pub async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<Route>>> {
    Ok(Json(state.store.list()))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Route>>> {
    Ok(Json(state.store.search(&params.q)))
}

/// Create a route (`id: 0` auto-assigns) or replace an existing one.
pub async fn create(
    State(state): State<SharedState>,
    Json(route): Json<Route>,
) -> ApiResult<(StatusCode, Json<Route>)> {
    let saved = state.store.create(route)?;
    state.sync_after_write().await;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn update(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(route): Json<Route>,
) -> ApiResult<Json<Route>> {
    let saved = state.store.update(id, route)?;
    state.sync_after_write().await;
    Ok(Json(saved))
}

pub async fn remove(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let removed = state.store.delete(id)?;
    state.sync_after_write().await;
    Ok(Json(serde_json::json!({
        "deleted": removed.id,
        "name": removed.name,
    })))
}

#[derive(Debug, Deserialize)]
pub struct NegativeSamplesRequest {
    pub negative_samples: Vec<String>,
    #[serde(default)]
    pub negative_threshold: Option<f32>,
}

/// Replace a route's negative sample list (and optionally its veto
/// threshold).
pub async fn replace_negative_samples(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(request): Json<NegativeSamplesRequest>,
) -> ApiResult<Json<Route>> {
    let saved = state.store.replace_negative_samples(
        id,
        request.negative_samples,
        request.negative_threshold,
    )?;
    state.sync_after_write().await;
    Ok(Json(saved))
}

#[derive(Debug, Deserialize)]
pub struct GenerateUtterancesRequest {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_generate_count")]
    pub count: usize,
    #[serde(default)]
    pub utterances: Option<Vec<String>>,
}

fn default_generate_count() -> usize {
    5
}

const MAX_GENERATE_COUNT: usize = 50;

/// Expand a route's examples with LLM-generated utterances.
///
/// Nothing is persisted: the caller reviews the returned route and saves
/// it explicitly if accepted.
pub async fn generate_utterances(
    State(state): State<SharedState>,
    Json(request): Json<GenerateUtterancesRequest>,
) -> ApiResult<Json<Route>> {
    if request.count == 0 || request.count > MAX_GENERATE_COUNT {
        return Err(AppError::Validation(format!(
            "count must be between 1 and {}",
            MAX_GENERATE_COUNT
        ))
        .into());
    }

    let reference = request.utterances.clone().unwrap_or_default();
    let context = RouteContext {
        id: request.id,
        name: request.name.clone(),
        description: request.description.clone(),
        utterances: reference.clone(),
    };

    let advisor = state.advisor()?;
    let generated = advisor
        .generate_utterances(&context, request.count, &reference)
        .await?;

    let mut utterances = reference;
    utterances.extend(generated);

    // Overlay onto the stored route when it exists so thresholds and
    // negatives are preserved in the preview.
    let existing = (request.id != 0)
        .then(|| state.store.get(request.id))
        .flatten();

    let route = match existing {
        Some(stored) => Route {
            id: stored.id,
            name: if request.name.is_empty() {
                stored.name
            } else {
                request.name
            },
            description: if request.description.is_empty() {
                stored.description
            } else {
                request.description
            },
            utterances,
            negative_samples: stored.negative_samples,
            score_threshold: stored.score_threshold,
            negative_threshold: stored.negative_threshold,
        },
        None => Route {
            id: request.id,
            name: request.name,
            description: request.description,
            utterances,
            negative_samples: Vec::new(),
            score_threshold: default_score_threshold(),
            negative_threshold: default_negative_threshold(),
        },
    };

    Ok(Json(route))
}
