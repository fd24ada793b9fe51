//! Client for providers speaking the OpenAI chat-completions dialect
//! (DeepSeek, OpenRouter, Doubao, Qwen).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use intent_core::{AppError, AppResult};

use crate::client::{ChatClient, ChatRequest, ChatResponse};

/// Per-request deadline for advisor completions; generation prompts can
/// take a while on slow providers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: String,
}

pub struct OpenAiCompatClient {
    provider: &'static str,
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn new(
        provider: &'static str,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        let base = base_url.into();
        Self {
            provider,
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenAiCompatClient {
    fn provider_name(&self) -> &str {
        self.provider
    }

    async fn complete(&self, request: &ChatRequest) -> AppResult<ChatResponse> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = WireRequest {
            model: &self.model,
            messages,
            temperature: request.temperature.or(Some(self.temperature)),
            max_tokens: request.max_tokens,
        };

        tracing::debug!("Sending completion request to {}", self.provider);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("{} request failed: {}", self.provider, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!(
                "{} API error ({}): {}",
                self.provider, status, detail
            )));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("{} returned invalid JSON: {}", self.provider, e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Llm(format!("{} returned no choices", self.provider)))?;

        Ok(ChatResponse {
            content,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_normalization() {
        let client = OpenAiCompatClient::new("deepseek", "https://api.deepseek.com/", "k", "m", 0.7);
        assert_eq!(client.url, "https://api.deepseek.com/chat/completions");
    }

    #[test]
    fn test_wire_response_parsing() {
        let raw = r#"{
            "model": "deepseek-chat",
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }"#;
        let parsed: WireResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }
}
