//! Error types for Intent Hub.
//!
//! This module defines a unified error enum covering every error category
//! the engine can surface: request validation, missing resources,
//! authentication, backend outages, write conflicts and cancellation.

use thiserror::Error;

/// Unified error type for Intent Hub.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// Errors are represented and propagated, never panicked on.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad request shape, empty utterances, id collisions. Surfaced as 400.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing route or other resource. Surfaced as 404.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or invalid API key. Surfaced as 401.
    #[error("Unauthorized: {0}")]
    Auth(String),

    /// A backing service (embedder, vector index, LLM) is unreachable or
    /// erroring. Surfaced as 500 with the backend named in the detail.
    #[error("Backend '{backend}' unavailable: {message}")]
    Backend { backend: String, message: String },

    /// A concurrent write raced; the caller should retry. Surfaced as 500.
    #[error("Conflicting write: {0}")]
    Conflict(String),

    /// Operation aborted by client disconnect or timeout.
    #[error("Operation cancelled")]
    Cancelled,

    /// Settings / startup configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM advisor errors (provider errors, unparseable replies)
    #[error("LLM error: {0}")]
    Llm(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Build a `Backend` error naming the failing collaborator.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable tag used in error response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Auth(_) => "auth_error",
            AppError::Backend { .. } => "backend_unavailable",
            AppError::Conflict(_) => "conflict_state",
            AppError::Cancelled => "cancelled",
            AppError::Config(_) => "config_error",
            AppError::Llm(_) => "llm_error",
            AppError::Io(_) => "io_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_names_the_backend() {
        let err = AppError::backend("qdrant", "connection refused");
        assert_eq!(err.kind(), "backend_unavailable");
        assert!(err.to_string().contains("qdrant"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let bad: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: AppError = bad.unwrap_err().into();
        assert_eq!(err.kind(), "serialization_error");
    }
}
