//! In-process vector index.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use intent_core::{AppError, AppResult};
use uuid::Uuid;

use crate::embeddings::cosine_similarity;
use crate::index::{PointFilter, VectorIndex};
use crate::types::{Point, PointPayload, SearchHit};

/// Map-backed index for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    dim: usize,
    points: RwLock<HashMap<Uuid, Point>>,
}

impl MemoryIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            points: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> AppResult<std::sync::RwLockReadGuard<'_, HashMap<Uuid, Point>>> {
        self.points
            .read()
            .map_err(|_| AppError::backend("memory-index", "poisoned lock"))
    }

    fn write(&self) -> AppResult<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Point>>> {
        self.points
            .write()
            .map_err(|_| AppError::backend("memory-index", "poisoned lock"))
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    fn backend_name(&self) -> &str {
        "memory"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn healthy(&self) -> bool {
        true
    }

    async fn upsert(&self, points: Vec<Point>) -> AppResult<()> {
        for point in &points {
            if point.vector.len() != self.dim {
                return Err(AppError::backend(
                    "memory-index",
                    format!(
                        "vector dimension {} does not match index dimension {}",
                        point.vector.len(),
                        self.dim
                    ),
                ));
            }
        }

        let mut map = self.write()?;
        for point in points {
            map.insert(point.id, point);
        }
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> AppResult<()> {
        let mut map = self.write()?;
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn delete_by_route(&self, route_id: i64) -> AppResult<()> {
        let mut map = self.write()?;
        map.retain(|_, point| point.payload.route_id != route_id);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &PointFilter,
    ) -> AppResult<Vec<SearchHit>> {
        let map = self.read()?;

        let mut hits: Vec<SearchHit> = map
            .values()
            .filter(|point| filter.matches(&point.payload))
            .map(|point| SearchHit {
                id: point.id,
                score: cosine_similarity(vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        // Secondary key makes equal-score ordering deterministic.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn scroll(&self, filter: &PointFilter) -> AppResult<Vec<Point>> {
        let map = self.read()?;
        let mut points: Vec<Point> = map
            .values()
            .filter(|point| filter.matches(&point.payload))
            .cloned()
            .collect();
        points.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(points)
    }

    async fn all_ids_with_payload(&self) -> AppResult<HashMap<Uuid, PointPayload>> {
        let map = self.read()?;
        Ok(map
            .iter()
            .map(|(id, point)| (*id, point.payload.clone()))
            .collect())
    }

    async fn ids_by_route(&self, route_id: i64) -> AppResult<HashSet<Uuid>> {
        let map = self.read()?;
        Ok(map
            .values()
            .filter(|point| point.payload.route_id == route_id)
            .map(|point| point.id)
            .collect())
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.read()?.len())
    }

    async fn reset(&self) -> AppResult<()> {
        self.write()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{negative_point_id, positive_point_id};

    fn point(route_id: i64, utterance: &str, vector: Vec<f32>, negative: bool) -> Point {
        let id = if negative {
            negative_point_id(route_id, utterance)
        } else {
            positive_point_id(route_id, utterance)
        };
        Point {
            id,
            vector,
            payload: PointPayload {
                route_id,
                route_name: format!("route-{}", route_id),
                utterance: utterance.to_string(),
                is_negative: negative,
                score_threshold: 0.75,
                negative_threshold: 0.95,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_id() {
        let index = MemoryIndex::new(3);
        let p = point(1, "hello", vec![1.0, 0.0, 0.0], false);
        index.upsert(vec![p.clone()]).await.unwrap();
        index.upsert(vec![p]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let index = MemoryIndex::new(3);
        let p = point(1, "hello", vec![1.0, 0.0], false);
        assert!(index.upsert(vec![p]).await.is_err());
    }

    #[tokio::test]
    async fn test_search_orders_by_score() {
        let index = MemoryIndex::new(3);
        index
            .upsert(vec![
                point(1, "exact", vec![1.0, 0.0, 0.0], false),
                point(2, "near", vec![0.8, 0.6, 0.0], false),
                point(3, "far", vec![0.0, 0.0, 1.0], false),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0, 0.0], 2, &PointFilter::positives())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.utterance, "exact");
        assert_eq!(hits[1].payload.utterance, "near");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_search_respects_negative_filter() {
        let index = MemoryIndex::new(3);
        index
            .upsert(vec![
                point(1, "yes", vec![1.0, 0.0, 0.0], false),
                point(1, "no", vec![1.0, 0.0, 0.0], true),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0, 0.0], 10, &PointFilter::negatives_of(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].payload.is_negative);
    }

    #[tokio::test]
    async fn test_delete_by_route_removes_both_kinds() {
        let index = MemoryIndex::new(3);
        index
            .upsert(vec![
                point(1, "a", vec![1.0, 0.0, 0.0], false),
                point(1, "b", vec![0.0, 1.0, 0.0], true),
                point(2, "c", vec![0.0, 0.0, 1.0], false),
            ])
            .await
            .unwrap();

        index.delete_by_route(1).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index.ids_by_route(1).await.unwrap().is_empty());
        assert_eq!(index.ids_by_route(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scroll_is_deterministic() {
        let index = MemoryIndex::new(3);
        index
            .upsert(vec![
                point(1, "a", vec![1.0, 0.0, 0.0], false),
                point(2, "b", vec![0.0, 1.0, 0.0], false),
            ])
            .await
            .unwrap();

        let first = index.scroll(&PointFilter::any()).await.unwrap();
        let second = index.scroll(&PointFilter::any()).await.unwrap();
        assert_eq!(first, second);
    }
}
