//! Overlap diagnostics, repair suggestions and the 2-D projection.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use intent_llm::RouteContext;
use intent_routing::types::{ProjectionReport, Route, RouteDiagnostics};
use intent_routing::CancelToken;

use crate::error::ApiResult;
use crate::state::SharedState;

/// How many instance conflicts are quoted to the repair advisor.
const REPAIR_CONTEXT_CONFLICTS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct OverlapParams {
    #[serde(default)]
    pub refresh: bool,
}

/// Full overlap report across all routes.
pub async fn overlap(
    State(state): State<SharedState>,
    Query(params): Query<OverlapParams>,
) -> ApiResult<Json<Vec<RouteDiagnostics>>> {
    let components = state.components();
    let report = components
        .diagnostics
        .overlap(&state.store, params.refresh, &CancelToken::new())
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct RepairRequest {
    pub source_route_id: i64,
    pub target_route_id: i64,
}

#[derive(Debug, Serialize)]
pub struct RepairSuggestion {
    pub route_id: i64,
    pub route_name: String,
    pub rationalization: String,
    pub new_utterances: Vec<String>,
    pub negative_samples: Vec<String>,
    pub conflicting_utterances: Vec<String>,
}

/// Ask the advisor how to disentangle two overlapping routes. Advisory
/// only: nothing is applied until the operator accepts it.
pub async fn repair(
    State(state): State<SharedState>,
    Json(request): Json<RepairRequest>,
) -> ApiResult<Json<RepairSuggestion>> {
    let source = require_route(&state, request.source_route_id)?;
    let target = require_route(&state, request.target_route_id)?;

    let components = state.components();
    let (_region, conflicts) = components
        .diagnostics
        .analyze_pair(&state.store, source.id, target.id)
        .await?;

    let conflict_lines: Vec<String> = conflicts
        .iter()
        .take(REPAIR_CONTEXT_CONFLICTS)
        .map(|c| {
            format!(
                "'{}' conflicts with '{}' (similarity {:.4})",
                c.source_utterance, c.target_utterance, c.similarity
            )
        })
        .collect();

    let advisor = state.advisor()?;
    let advice = advisor
        .suggest_repair(&context_of(&source), &context_of(&target), &conflict_lines)
        .await?;

    Ok(Json(RepairSuggestion {
        route_id: source.id,
        route_name: source.name,
        rationalization: advice.rationalization,
        new_utterances: advice.new_utterances,
        negative_samples: advice.negative_samples,
        conflicting_utterances: advice.conflicting_utterances,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ApplyRepairRequest {
    pub route_id: i64,
    pub utterances: Vec<String>,
}

/// Apply an accepted repair: replace only the route's utterances.
pub async fn apply_repair(
    State(state): State<SharedState>,
    Json(request): Json<ApplyRepairRequest>,
) -> ApiResult<Json<Route>> {
    let saved = state
        .store
        .replace_utterances(request.route_id, request.utterances)?;
    state.sync_after_write().await;
    Ok(Json(saved))
}

#[derive(Debug, Deserialize)]
pub struct UmapParams {
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,
    #[serde(default = "default_min_dist")]
    pub min_dist: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_neighbors() -> usize {
    15
}

fn default_min_dist() -> f32 {
    0.1
}

fn default_seed() -> u64 {
    42
}

/// Project every utterance vector to 2-D for visualization.
pub async fn umap(
    State(state): State<SharedState>,
    Query(params): Query<UmapParams>,
) -> ApiResult<Json<ProjectionReport>> {
    let components = state.components();
    let report = components
        .diagnostics
        .project(params.n_neighbors, params.min_dist, params.seed)
        .await?;
    Ok(Json(report))
}

fn require_route(state: &SharedState, id: i64) -> Result<Route, crate::error::ApiError> {
    state
        .store
        .get(id)
        .ok_or_else(|| intent_core::AppError::NotFound(format!("Route {} does not exist", id)).into())
}

fn context_of(route: &Route) -> RouteContext {
    RouteContext {
        id: route.id,
        name: route.name.clone(),
        description: route.description.clone(),
        utterances: route.utterances.clone(),
    }
}
