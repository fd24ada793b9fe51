//! HuggingFace Inference API embedding provider.
//!
//! API reference: https://huggingface.co/docs/api-inference

use crate::embeddings::{l2_normalize, Embedder};
use intent_core::{AppError, AppResult};
use serde::Serialize;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api-inference.huggingface.co";
const ROUTER_ENDPOINT: &str = "https://router.huggingface.co";

/// Per-request deadline for the embedding service.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry schedule for transient failures; total wall clock stays bounded.
const RETRY_DELAYS: &[Duration] = &[Duration::from_millis(250), Duration::from_millis(1000)];

#[derive(Debug, Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
    options: RequestOptions,
}

#[derive(Debug, Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

/// Remote embedder backed by the HuggingFace feature-extraction pipeline.
pub struct HfEmbedder {
    client: reqwest::Client,
    url: String,
    token: String,
    model: String,
    dim: usize,
}

impl HfEmbedder {
    /// Connect and probe the model once to learn its dimension.
    pub async fn connect(
        model: &str,
        token: &str,
        inference_provider: Option<&str>,
    ) -> AppResult<Self> {
        let base = match inference_provider {
            Some(provider) if !provider.trim().is_empty() => {
                format!("{}/{}", ROUTER_ENDPOINT, provider.trim())
            }
            _ => DEFAULT_ENDPOINT.to_string(),
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::backend("embedder", e.to_string()))?;

        let mut embedder = Self {
            client,
            url: format!("{}/pipeline/feature-extraction/{}", base, model),
            token: token.to_string(),
            model: model.to_string(),
            dim: 0,
        };

        let probe = embedder.request(&["ping".to_string()]).await?;
        let dim = probe.first().map(|v| v.len()).unwrap_or(0);
        if dim == 0 {
            return Err(AppError::backend(
                "embedder",
                format!("model '{}' returned an empty probe vector", model),
            ));
        }
        embedder.dim = dim;

        Ok(embedder)
    }

    async fn request(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let body = FeatureExtractionRequest {
            inputs: texts,
            options: RequestOptions {
                wait_for_model: true,
            },
        };

        let mut last_error = None;
        for attempt in 0..=RETRY_DELAYS.len() {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAYS[attempt - 1]).await;
                tracing::debug!("Retrying embedding request (attempt {})", attempt + 1);
            }

            match self.send_once(&body).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if is_transient(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::backend("embedder", "retries exhausted")))
    }

    async fn send_once(&self, body: &FeatureExtractionRequest<'_>) -> AppResult<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::backend("embedder", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::backend(
                "embedder",
                format!("HTTP {}: {}", status, detail),
            ));
        }

        let mut vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| AppError::backend("embedder", format!("bad response body: {}", e)))?;

        for vector in &mut vectors {
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}

/// 5xx and connection-level failures are worth retrying; 4xx are not.
fn is_transient(error: &AppError) -> bool {
    match error {
        AppError::Backend { message, .. } => {
            !message.starts_with("HTTP 4") && !message.starts_with("bad response body")
        }
        _ => false,
    }
}

#[async_trait::async_trait]
impl Embedder for HfEmbedder {
    fn provider_name(&self) -> &str {
        "huggingface"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.request(texts).await?;

        if vectors.len() != texts.len() {
            return Err(AppError::backend(
                "embedder",
                format!(
                    "expected {} vectors, got {}",
                    texts.len(),
                    vectors.len()
                ),
            ));
        }
        for vector in &vectors {
            if vector.len() != self.dim {
                return Err(AppError::backend(
                    "embedder",
                    format!("dimension drift: expected {}, got {}", self.dim, vector.len()),
                ));
            }
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&AppError::backend(
            "embedder",
            "HTTP 503 Service Unavailable: loading"
        )));
        assert!(is_transient(&AppError::backend(
            "embedder",
            "connection reset by peer"
        )));
        assert!(!is_transient(&AppError::backend(
            "embedder",
            "HTTP 401 Unauthorized: bad token"
        )));
        assert!(!is_transient(&AppError::Validation("nope".into())));
    }
}
