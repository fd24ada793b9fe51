//! Provider selection.
//!
//! Most supported providers speak the OpenAI chat-completions dialect and
//! differ only in base URL and default model; Gemini has its own wire
//! format. The factory turns `{provider, api_key, base_url, model,
//! temperature}` into a ready client.

use std::sync::Arc;

use intent_core::{AppError, AppResult};

use crate::client::ChatClient;
use crate::providers::{GeminiClient, OpenAiCompatClient};

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Deepseek,
    Openrouter,
    Doubao,
    Qwen,
    Gemini,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deepseek" => Some(Self::Deepseek),
            "openrouter" => Some(Self::Openrouter),
            "doubao" => Some(Self::Doubao),
            "qwen" => Some(Self::Qwen),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek",
            Self::Openrouter => "openrouter",
            Self::Doubao => "doubao",
            Self::Qwen => "qwen",
            Self::Gemini => "gemini",
        }
    }

    /// Default API endpoint for providers that accept one.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::Deepseek => Some("https://api.deepseek.com"),
            Self::Openrouter => Some("https://openrouter.ai/api/v1"),
            Self::Doubao => Some("https://ark.cn-beijing.volces.com/api/v3"),
            Self::Qwen => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            Self::Gemini => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek-chat",
            Self::Openrouter => "openai/gpt-4o-mini",
            Self::Doubao => "doubao-pro-32k",
            Self::Qwen => "qwen-turbo",
            Self::Gemini => "gemini-pro",
        }
    }
}

/// Resolved connection options for one client.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
}

/// Create a chat client from resolved options.
pub fn create_client(options: &LlmOptions) -> AppResult<Arc<dyn ChatClient>> {
    let provider = Provider::parse(&options.provider).ok_or_else(|| {
        AppError::Llm(format!(
            "Unsupported LLM provider '{}'; supported: deepseek, openrouter, doubao, qwen, gemini",
            options.provider
        ))
    })?;

    let api_key = options
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            AppError::Llm(format!("Provider '{}' requires an API key", provider.as_str()))
        })?;

    let model = options
        .model
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| provider.default_model().to_string());

    tracing::info!(
        "Creating LLM client: provider={}, model={}",
        provider.as_str(),
        model
    );

    match provider {
        Provider::Gemini => Ok(Arc::new(GeminiClient::new(
            api_key,
            model,
            options.temperature,
        ))),
        _ => {
            let base_url = options
                .base_url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .or_else(|| provider.default_base_url().map(|u| u.to_string()))
                .ok_or_else(|| {
                    AppError::Llm(format!(
                        "Provider '{}' requires a base URL",
                        provider.as_str()
                    ))
                })?;

            Ok(Arc::new(OpenAiCompatClient::new(
                provider.as_str(),
                base_url,
                api_key,
                model,
                options.temperature,
            )))
        }
    }
}
