//! Offline lexical embedding provider.

use crate::embeddings::{l2_normalize, Embedder};
use intent_core::AppResult;
use std::collections::HashMap;

/// Words too common to carry routing signal.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "to", "of", "in", "on", "at", "for", "and",
    "or", "it", "its", "my", "me", "you", "your", "i", "we", "do", "does", "can", "please",
];

/// Deterministic bag-of-features embedder for offline operation.
///
/// Words and their character n-grams are hashed into a fixed-dimension
/// vector weighted by dampened term frequency, then unit-normalized. Not a
/// semantic model, but stable per text and content-dependent, which is what
/// development, tests and air-gapped deployments need.
#[derive(Debug)]
pub struct LexicalEmbedder {
    dim: usize,
}

impl LexicalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let lower = text.to_lowercase();

        let mut term_freq: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        {
            *term_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &term_freq {
            let weight = 1.0 + (*freq as f32).ln();

            // Whole word feature
            vector[fnv1a(word.as_bytes()) as usize % self.dim] += weight;

            // Character n-gram features smooth over inflection and typos
            let chars: Vec<char> = word.chars().collect();
            for window in 2..=3usize {
                if chars.len() < window {
                    continue;
                }
                for gram in chars.windows(window) {
                    let key: String = gram.iter().collect();
                    let slot = fnv1a(key.as_bytes()) as usize % self.dim;
                    vector[slot] += weight * 0.5;
                }
            }
        }

        l2_normalize(&mut vector);
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait::async_trait]
impl Embedder for LexicalEmbedder {
    fn provider_name(&self) -> &str {
        "lexical"
    }

    fn model_name(&self) -> &str {
        "lexical-ngram-v1"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[tokio::test]
    async fn test_dimension_and_names() {
        let embedder = LexicalEmbedder::new(256);
        assert_eq!(embedder.dim(), 256);
        assert_eq!(embedder.provider_name(), "lexical");
    }

    #[tokio::test]
    async fn test_vectors_are_normalized() {
        let embedder = LexicalEmbedder::new(128);
        let v = embedder.embed_one("check the weather in Paris").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = LexicalEmbedder::new(128);
        let a = embedder.embed_one("refund my last order").await.unwrap();
        let b = embedder.embed_one("refund my last order").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_related_texts_score_higher_than_unrelated() {
        let embedder = LexicalEmbedder::new(512);
        let weather1 = embedder.embed_one("weather forecast tomorrow").await.unwrap();
        let weather2 = embedder.embed_one("weather forecast today").await.unwrap();
        let other = embedder.embed_one("convert dollars euros").await.unwrap();

        let related = cosine_similarity(&weather1, &weather2);
        let unrelated = cosine_similarity(&weather1, &other);
        assert!(related > unrelated);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = LexicalEmbedder::new(128);
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let batch = embedder.embed(&texts).await.unwrap();
        let first = embedder.embed_one("first text").await.unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], first);
    }

    #[tokio::test]
    async fn test_unicode_input() {
        let embedder = LexicalEmbedder::new(128);
        let v = embedder.embed_one("帮我查一下北京的天气").await.unwrap();
        assert_eq!(v.len(), 128);
    }
}
