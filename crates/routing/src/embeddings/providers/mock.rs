//! Mock embedding provider for tests.

use crate::embeddings::{l2_normalize, Embedder};
use intent_core::AppResult;
use std::collections::HashMap;

/// Test embedder with scriptable vectors.
///
/// Preset texts return their configured vector (normalized). Unknown texts
/// hash to a single basis dimension, so two distinct texts are orthogonal
/// unless deliberately preset otherwise, and identical texts always agree.
#[derive(Debug, Default)]
pub struct MockEmbedder {
    dim: usize,
    presets: HashMap<String, Vec<f32>>,
}

impl MockEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            presets: HashMap::new(),
        }
    }

    /// Preset the vector returned for `text`.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        let mut vector = vector;
        vector.resize(self.dim, 0.0);
        l2_normalize(&mut vector);
        self.presets.insert(text.into(), vector);
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        if let Some(preset) = self.presets.get(text) {
            return preset.clone();
        }

        let mut hash: u64 = 1469598103934665603;
        for b in text.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(1099511628211);
        }

        let mut vector = vec![0.0; self.dim];
        vector[hash as usize % self.dim] = 1.0;
        vector
    }
}

#[async_trait::async_trait]
impl Embedder for MockEmbedder {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-v1"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
