//! Chat client abstraction and request/response types.

use serde::{Deserialize, Serialize};

use intent_core::AppResult;

/// A chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User message content
    pub prompt: String,

    /// Optional system message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Cap on generated tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated text
    pub content: String,

    /// Model that produced it
    pub model: String,
}

/// Trait for chat-completion providers.
///
/// Implementations are stateless request/response adapters; one instance
/// may serve concurrent calls.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Provider name (e.g. "deepseek", "gemini").
    fn provider_name(&self) -> &str;

    /// Perform a completion.
    async fn complete(&self, request: &ChatRequest) -> AppResult<ChatResponse>;
}
