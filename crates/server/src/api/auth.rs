//! Login endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use intent_core::AppError;

use crate::auth::AuthManager;
use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub api_key: String,
    pub message: String,
}

/// Exchange operator credentials for a management API key.
pub async fn login(
    State(state): State<SharedState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let settings = state.settings_snapshot();

    if !AuthManager::verify_credentials(&settings, &request.username, &request.password) {
        return Err(AppError::Auth("Invalid username or password".to_string()).into());
    }

    let api_key = state.auth.issue_key(&request.username);
    Ok(Json(LoginResponse {
        api_key,
        message: "Keep this key safe; management requests must send it in a header".to_string(),
    }))
}
