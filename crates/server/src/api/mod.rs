//! REST surface.
//!
//! Management endpoints sit behind the API-key layer; `/predict` has its
//! own key scheme so downstream services never hold administrative
//! credentials; login and health are open.

pub mod auth;
pub mod diagnostics;
pub mod health;
pub mod predict;
pub mod reindex;
pub mod routes;
pub mod settings;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;

use crate::auth::{require_api_key, require_predict_key};
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let management = Router::new()
        .route("/routes", get(routes::list).post(routes::create))
        .route("/routes/search", get(routes::search))
        .route("/routes/:id", put(routes::update).delete(routes::remove))
        .route(
            "/routes/:id/negative-samples",
            post(routes::replace_negative_samples),
        )
        .route(
            "/routes/generate-utterances",
            post(routes::generate_utterances),
        )
        .route("/reindex", post(reindex::reindex))
        .route("/diagnostics/overlap", get(diagnostics::overlap))
        .route("/diagnostics/repair", post(diagnostics::repair))
        .route("/diagnostics/apply-repair", post(diagnostics::apply_repair))
        .route("/diagnostics/umap", get(diagnostics::umap))
        .route("/settings", get(settings::read).post(settings::update))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let predict = Router::new()
        .route("/predict", post(predict::predict))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_predict_key,
        ));

    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/health", get(health::health))
        .merge(management)
        .merge(predict)
        .with_state(state)
}
