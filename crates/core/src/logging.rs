//! Logging infrastructure for Intent Hub.
//!
//! Initializes the tracing subscriber for structured logging. Logs go to
//! stderr so stdout stays clean for data output.

use tracing_subscriber::EnvFilter;

use crate::error::{AppError, AppResult};

/// Initialize the tracing subscriber.
///
/// The filter is taken from `level` when given, otherwise from `RUST_LOG`,
/// otherwise `info`. ANSI colors are disabled when `NO_COLOR` is set.
///
/// Calling this twice returns an error from the subscriber registry; the
/// server initializes it exactly once at startup.
pub fn init(level: Option<&str>) -> AppResult<()> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(level.unwrap_or(&default_level))
        .map_err(|e| AppError::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(std::env::var("NO_COLOR").is_err())
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_accepts_valid_filter() {
        // May fail with "already initialized" when other tests ran first;
        // both outcomes exercise the registry path.
        let _ = init(Some("debug"));
    }

    #[test]
    fn test_init_rejects_invalid_filter() {
        assert!(init(Some("not==a==filter")).is_err());
    }
}
