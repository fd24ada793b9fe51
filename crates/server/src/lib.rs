//! Intent Hub HTTP server.
//!
//! Wires the routing engine, the LLM advisor and the auth layer behind the
//! REST surface. The binary entry point lives in `main.rs`; everything
//! else is a library so integration tests can drive the router directly.

pub mod api;
pub mod auth;
pub mod error;
pub mod state;

pub use state::{AppState, SharedState};
