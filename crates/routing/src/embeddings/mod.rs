//! Embedding providers.
//!
//! All downstream similarity math assumes unit vectors with cosine
//! similarity expressed as a dot product; the embedder is the single point
//! that enforces the norm.

pub mod providers;

use std::sync::Arc;

use intent_core::{AppResult, Settings};

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Provider name (e.g. "huggingface", "lexical")
    fn provider_name(&self) -> &str;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Embedding dimension. Every returned vector has exactly this length.
    fn dim(&self) -> usize;

    /// Embed a batch of texts into L2-normalized vectors.
    ///
    /// The batch is atomic: a failure fails the whole call and no partial
    /// result is returned.
    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embed a single text (convenience method).
    async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            intent_core::AppError::backend(self.provider_name(), "no embedding returned")
        })
    }
}

/// Create the embedder selected by the settings.
///
/// A configured HuggingFace token selects the remote Inference API; when
/// the remote probe fails the offline lexical embedder takes over so the
/// engine stays usable without network access.
pub async fn create_embedder(settings: &Settings) -> AppResult<Arc<dyn Embedder>> {
    if let Some(token) = settings
        .huggingface_access_token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
    {
        match providers::huggingface::HfEmbedder::connect(
            &settings.embedding_model_name,
            token,
            settings.huggingface_provider.as_deref(),
        )
        .await
        {
            Ok(embedder) => {
                tracing::info!(
                    "Embedder ready: HuggingFace Inference API, model {}, dim {}",
                    embedder.model_name(),
                    embedder.dim()
                );
                return Ok(Arc::new(embedder));
            }
            Err(e) => {
                tracing::warn!("HuggingFace embedder unavailable ({}), falling back to lexical", e);
            }
        }
    }

    let embedder = providers::lexical::LexicalEmbedder::new(settings.embedding_dim);
    tracing::info!(
        "Embedder ready: offline lexical, dim {}",
        embedder.dim()
    );
    Ok(Arc::new(embedder))
}

/// Scale a vector to unit length in place. Zero vectors stay zero.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Cosine similarity of two vectors.
///
/// Robust to non-unit inputs; returns 0 for zero or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
