//! Prompt system for the Intent Hub advisor.
//!
//! Provides the built-in prompt templates for utterance generation and
//! overlap repair, plus a small Handlebars renderer. Operators can
//! override either template through the runtime settings.

pub mod builder;
pub mod templates;

pub use builder::render;
pub use templates::{DEFAULT_REPAIR_PROMPT, DEFAULT_UTTERANCE_PROMPT};
