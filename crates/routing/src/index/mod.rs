//! Vector index abstraction and backends.
//!
//! The index stores one point per `(route_id, utterance)` pair, keyed by a
//! deterministic id, with a payload carrying the route identity. Backends:
//! Qdrant over REST, an embedded SQLite file, and an in-process map for
//! tests and ephemeral runs.

pub mod memory;
pub mod qdrant;
pub mod sqlite;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use intent_core::{AppResult, Settings};
use uuid::Uuid;

use crate::types::{Point, PointPayload, SearchHit};

/// Payload predicate applied to search and scroll operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointFilter {
    /// Restrict to one route.
    pub route_id: Option<i64>,
    /// `Some(false)` keeps utterance points, `Some(true)` keeps negative
    /// samples, `None` keeps both.
    pub negatives: Option<bool>,
}

impl PointFilter {
    /// Every point.
    pub fn any() -> Self {
        Self::default()
    }

    /// Utterance points of all routes.
    pub fn positives() -> Self {
        Self {
            route_id: None,
            negatives: Some(false),
        }
    }

    /// Utterance points of one route.
    pub fn positives_of(route_id: i64) -> Self {
        Self {
            route_id: Some(route_id),
            negatives: Some(false),
        }
    }

    /// Negative-sample points of one route.
    pub fn negatives_of(route_id: i64) -> Self {
        Self {
            route_id: Some(route_id),
            negatives: Some(true),
        }
    }

    pub fn matches(&self, payload: &PointPayload) -> bool {
        if let Some(route_id) = self.route_id {
            if payload.route_id != route_id {
                return false;
            }
        }
        if let Some(negatives) = self.negatives {
            if payload.is_negative != negatives {
                return false;
            }
        }
        true
    }
}

/// Trait for vector index backends.
///
/// Operations are individually atomic; batches are best-effort atomic at
/// the backend's granularity. The engine never assumes cross-point
/// transactionality and instead re-runs the synchronizer after writes.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name used in logs and error details.
    fn backend_name(&self) -> &str;

    /// Vector dimension this index was created with.
    fn dim(&self) -> usize;

    /// Cheap readiness probe for the health endpoint.
    async fn healthy(&self) -> bool;

    /// Insert or replace points by id.
    async fn upsert(&self, points: Vec<Point>) -> AppResult<()>;

    async fn delete_by_ids(&self, ids: &[Uuid]) -> AppResult<()>;

    async fn delete_by_route(&self, route_id: i64) -> AppResult<()>;

    /// Top-k nearest points by cosine similarity, descending.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &PointFilter,
    ) -> AppResult<Vec<SearchHit>>;

    /// All matching points including their vectors.
    async fn scroll(&self, filter: &PointFilter) -> AppResult<Vec<Point>>;

    /// Identity snapshot used by the synchronizer diff.
    async fn all_ids_with_payload(&self) -> AppResult<HashMap<Uuid, PointPayload>>;

    async fn ids_by_route(&self, route_id: i64) -> AppResult<HashSet<Uuid>>;

    /// Total number of stored points (positives and negatives).
    async fn count(&self) -> AppResult<usize>;

    /// Drop every point, keeping the index usable.
    async fn reset(&self) -> AppResult<()>;
}

/// Create the vector index selected by the settings.
///
/// A configured `QDRANT_URL` selects the remote backend; otherwise the
/// engine runs on the embedded SQLite file, or fully in memory when the
/// store path is the literal `memory`.
pub async fn create_index(settings: &Settings, dim: usize) -> AppResult<Arc<dyn VectorIndex>> {
    if !settings.qdrant_url.trim().is_empty() {
        let index = qdrant::QdrantIndex::connect(
            &settings.qdrant_url,
            settings.qdrant_api_key.as_deref(),
            &settings.qdrant_collection,
            dim,
        )
        .await?;
        tracing::info!(
            "Vector index ready: qdrant at {} (collection {})",
            settings.qdrant_url,
            settings.qdrant_collection
        );
        return Ok(Arc::new(index));
    }

    if settings.vector_store_path == "memory" {
        tracing::info!("Vector index ready: in-memory");
        return Ok(Arc::new(memory::MemoryIndex::new(dim)));
    }

    let index = sqlite::SqliteIndex::open(Path::new(&settings.vector_store_path), dim).await?;
    tracing::info!(
        "Vector index ready: sqlite at {}",
        settings.vector_store_path
    );
    Ok(Arc::new(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(route_id: i64, negative: bool) -> PointPayload {
        PointPayload {
            route_id,
            route_name: "r".to_string(),
            utterance: "u".to_string(),
            is_negative: negative,
            score_threshold: 0.75,
            negative_threshold: 0.95,
        }
    }

    #[test]
    fn test_filter_any_matches_everything() {
        assert!(PointFilter::any().matches(&payload(1, false)));
        assert!(PointFilter::any().matches(&payload(2, true)));
    }

    #[test]
    fn test_filter_positives() {
        let filter = PointFilter::positives();
        assert!(filter.matches(&payload(1, false)));
        assert!(!filter.matches(&payload(1, true)));
    }

    #[test]
    fn test_filter_negatives_of_route() {
        let filter = PointFilter::negatives_of(7);
        assert!(filter.matches(&payload(7, true)));
        assert!(!filter.matches(&payload(7, false)));
        assert!(!filter.matches(&payload(8, true)));
    }

    #[tokio::test]
    async fn test_factory_selects_memory_backend() {
        let mut settings = Settings::default();
        settings.vector_store_path = "memory".to_string();
        let index = create_index(&settings, 8).await.unwrap();
        assert_eq!(index.backend_name(), "memory");
        assert_eq!(index.dim(), 8);
    }
}
