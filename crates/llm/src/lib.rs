//! LLM integration for Intent Hub.
//!
//! This crate provides a provider-neutral abstraction over chat-completion
//! APIs and the two advisory operations built on top of it: generating new
//! example utterances for a route and suggesting repairs for overlapping
//! routes. Advisor calls are strictly advisory — they never mutate engine
//! state and are never on the critical path of prediction.

pub mod advisor;
pub mod client;
pub mod factory;
pub mod providers;

// Re-export main types
pub use advisor::{Advisor, RepairAdvice, RouteContext};
pub use client::{ChatClient, ChatRequest, ChatResponse};
pub use factory::{create_client, LlmOptions, Provider};
