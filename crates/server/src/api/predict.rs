//! Prediction endpoint.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use intent_routing::Prediction;

use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub text: String,
}

/// Route a query. Returns the admitted routes best-first, or exactly the
/// synthetic fallback when nothing matches.
pub async fn predict(
    State(state): State<SharedState>,
    Json(request): Json<PredictRequest>,
) -> ApiResult<Json<Vec<Prediction>>> {
    let components = state.components();
    let predictions = components
        .predictor
        .predict(&state.store, &request.text)
        .await?;
    Ok(Json(predictions))
}
