//! API-key authentication.
//!
//! Two schemes coexist: management keys (issued at login with a TTL, or
//! static legacy keys from the `API_KEYS` setting) gate every management
//! endpoint, while a separate predict key gates only `/predict` so
//! downstream services can call prediction without administrative
//! credentials. Keys are accepted as `Authorization: Bearer <key>` or in
//! the `X-API-Key` header.

use std::collections::HashMap;
use std::sync::Mutex;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use intent_core::{AppError, Settings};

use crate::error::ApiError;
use crate::state::SharedState;

/// Issued keys expire after this long.
const KEY_TTL_MINUTES: i64 = 30;

struct IssuedKey {
    key: String,
    issued_at: DateTime<Utc>,
}

/// In-memory key registry. Legacy keys never expire; per-user keys do.
#[derive(Default)]
pub struct AuthManager {
    user_keys: Mutex<HashMap<String, IssuedKey>>,
    legacy_keys: Mutex<Vec<String>>,
}

impl AuthManager {
    /// Seed the registry with the static keys from the settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let legacy: Vec<String> = settings
            .api_keys
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if !legacy.is_empty() {
            tracing::info!("Loaded {} static API key(s)", legacy.len());
        }

        Self {
            user_keys: Mutex::new(HashMap::new()),
            legacy_keys: Mutex::new(legacy),
        }
    }

    /// Check login credentials against the configured operator account.
    pub fn verify_credentials(settings: &Settings, username: &str, password: &str) -> bool {
        username == settings.default_username && password == settings.default_password
    }

    /// Issue a key for `username`, reusing an unexpired one.
    pub fn issue_key(&self, username: &str) -> String {
        let mut keys = match self.user_keys.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(existing) = keys.get(username) {
            if Utc::now() - existing.issued_at < Duration::minutes(KEY_TTL_MINUTES) {
                tracing::debug!("Reusing API key for '{}'", username);
                return existing.key.clone();
            }
        }

        let key = Uuid::new_v4().to_string();
        keys.insert(
            username.to_string(),
            IssuedKey {
                key: key.clone(),
                issued_at: Utc::now(),
            },
        );
        tracing::info!("Issued API key for '{}'", username);
        key
    }

    /// Whether `key` is a currently valid management key.
    pub fn is_valid(&self, key: &str) -> bool {
        {
            let legacy = match self.legacy_keys.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if legacy.iter().any(|k| k == key) {
                return true;
            }
        }

        let mut keys = match self.user_keys.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Prune expired keys while we hold the lock.
        keys.retain(|_, issued| Utc::now() - issued.issued_at < Duration::minutes(KEY_TTL_MINUTES));
        keys.values().any(|issued| issued.key == key)
    }
}

/// Extract a key from `Authorization: Bearer` or `X-API-Key`.
pub fn extract_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// Middleware for management endpoints.
pub async fn require_api_key(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let enabled = state.settings_snapshot().auth_enabled;
    if !enabled {
        return Ok(next.run(request).await);
    }

    match extract_key(request.headers()) {
        Some(key) if state.auth.is_valid(&key) => Ok(next.run(request).await),
        Some(_) => Err(AppError::Auth("Invalid API key".to_string()).into()),
        None => Err(AppError::Auth(
            "Missing API key; send Authorization: Bearer <key> or X-API-Key".to_string(),
        )
        .into()),
    }
}

/// Middleware for the predict endpoint. A management key is also accepted
/// so operators can smoke-test predictions with their own credentials.
/// Without a configured predict key the endpoint falls back to management
/// auth; it is only open when auth is disabled entirely.
pub async fn require_predict_key(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let settings = state.settings_snapshot();
    let predict_key = settings
        .predict_auth_key
        .as_deref()
        .filter(|k| !k.trim().is_empty());

    if predict_key.is_none() && !settings.auth_enabled {
        return Ok(next.run(request).await);
    }

    match extract_key(request.headers()) {
        Some(key)
            if predict_key.map_or(false, |expected| key == expected)
                || state.auth.is_valid(&key) =>
        {
            Ok(next.run(request).await)
        }
        Some(_) => Err(AppError::Auth("Invalid predict key".to_string()).into()),
        None => Err(AppError::Auth("Missing predict key".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_legacy_keys_parsed_from_settings() {
        let mut settings = Settings::default();
        settings.api_keys = Some("alpha, beta ,".to_string());

        let auth = AuthManager::from_settings(&settings);
        assert!(auth.is_valid("alpha"));
        assert!(auth.is_valid("beta"));
        assert!(!auth.is_valid("gamma"));
    }

    #[test]
    fn test_issue_key_is_reused_until_expiry() {
        let auth = AuthManager::default();
        let first = auth.issue_key("admin");
        let second = auth.issue_key("admin");
        assert_eq!(first, second);
        assert!(auth.is_valid(&first));
    }

    #[test]
    fn test_credentials_check() {
        let settings = Settings::default();
        assert!(AuthManager::verify_credentials(&settings, "admin", "123456"));
        assert!(!AuthManager::verify_credentials(&settings, "admin", "wrong"));
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        assert_eq!(extract_key(&headers).as_deref(), Some("secret"));
    }

    #[test]
    fn test_extract_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret2"));
        assert_eq!(extract_key(&headers).as_deref(), Some("secret2"));
    }

    #[test]
    fn test_extract_missing() {
        assert_eq!(extract_key(&HeaderMap::new()), None);
    }
}
