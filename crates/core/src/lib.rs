//! Intent Hub core library.
//!
//! This crate provides the foundation shared by every Intent Hub component:
//! - Error handling (`AppError`, `AppResult`)
//! - Runtime settings with env/file/default precedence
//! - Logging infrastructure

pub mod error;
pub mod logging;
pub mod settings;

// Re-export commonly used types
pub use error::{AppError, AppResult};
pub use settings::Settings;
