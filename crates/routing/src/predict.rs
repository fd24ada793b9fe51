//! Query prediction.
//!
//! A query is embedded, matched against the top-K nearest utterance
//! points, reduced to a per-route maximum, and admitted through the dual
//! thresholds: the best positive score must reach the route's
//! `score_threshold`, and no negative sample may sit at or above the
//! route's `negative_threshold`.

use std::collections::BTreeMap;
use std::sync::Arc;

use intent_core::{AppError, AppResult};

use crate::embeddings::Embedder;
use crate::index::{PointFilter, VectorIndex};
use crate::store::RouteStore;
use crate::types::Prediction;

/// Default number of candidate hits retrieved per query.
pub const DEFAULT_TOP_K: usize = 20;

pub struct Predictor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    fallback_id: i64,
    fallback_name: String,
}

impl Predictor {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            top_k: DEFAULT_TOP_K,
            fallback_id: 0,
            fallback_name: "none".to_string(),
        }
    }

    /// Override the synthetic fallback identity.
    pub fn with_fallback(mut self, id: i64, name: impl Into<String>) -> Self {
        self.fallback_id = id;
        self.fallback_name = name.into();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Predict the routes matching `query`, best first.
    ///
    /// Never returns an empty list: when nothing is admitted the result is
    /// exactly the synthetic fallback with a `None` score. Thresholds are
    /// read from the authoritative store snapshot; hits whose route has
    /// vanished since indexing are skipped.
    pub async fn predict(&self, store: &RouteStore, query: &str) -> AppResult<Vec<Prediction>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("Query text must not be empty".into()));
        }

        let query_vector = self.embedder.embed_one(query).await?;
        let hits = self
            .index
            .search(&query_vector, self.top_k, &PointFilter::positives())
            .await?;
        tracing::debug!("Query '{}': {} raw hit(s)", query, hits.len());

        // Reduce utterance-level hits to the best score per route. BTreeMap
        // fixes the candidate iteration order for determinism.
        let mut best: BTreeMap<i64, f32> = BTreeMap::new();
        for hit in &hits {
            let entry = best.entry(hit.payload.route_id).or_insert(hit.score);
            if hit.score > *entry {
                *entry = hit.score;
            }
        }

        let mut admitted = Vec::new();
        for (route_id, score) in best {
            let Some(route) = store.get(route_id) else {
                tracing::debug!("Skipping hit for vanished route {}", route_id);
                continue;
            };

            if score < route.score_threshold {
                tracing::debug!(
                    "Below threshold: route {} score {:.4} < {:.2}",
                    route_id,
                    score,
                    route.score_threshold
                );
                continue;
            }

            if !route.negative_samples.is_empty() {
                let nearest_negative = self
                    .index
                    .search(&query_vector, 1, &PointFilter::negatives_of(route_id))
                    .await?;
                if let Some(negative) = nearest_negative.first() {
                    if negative.score >= route.negative_threshold {
                        tracing::info!(
                            "Negative veto: route {} ('{}'), negative '{}' scored {:.4} >= {:.2}",
                            route_id,
                            route.name,
                            negative.payload.utterance,
                            negative.score,
                            route.negative_threshold
                        );
                        continue;
                    }
                }
            }

            admitted.push(Prediction {
                id: route.id,
                name: route.name,
                score: Some(score),
            });
        }

        admitted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        if admitted.is_empty() {
            tracing::info!("No route admitted for '{}', returning fallback", query);
            return Ok(vec![Prediction {
                id: self.fallback_id,
                name: self.fallback_name.clone(),
                score: None,
            }]);
        }

        tracing::info!("Matched {} route(s) for '{}'", admitted.len(), query);
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::embeddings::providers::MockEmbedder;
    use crate::index::memory::MemoryIndex;
    use crate::sync::{SyncMode, Synchronizer};
    use crate::types::Route;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; DIM];
        v[i] = 1.0;
        v
    }

    /// Scripted geometry: weather utterances sit on axis 0, the flight
    /// negative leans on axis 2 but keeps a 0.6 weather component, so a
    /// flight-like query clears the positive threshold yet lands within
    /// negative-veto range.
    fn scripted_embedder() -> MockEmbedder {
        MockEmbedder::new(DIM)
            .with_vector("how is the weather in Beijing", axis(0))
            .with_vector("tomorrow's forecast", vec![0.9, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .with_vector("show my invoice", axis(1))
            .with_vector(
                "book a flight to Beijing",
                vec![0.6, 0.0, 0.8, 0.0, 0.0, 0.0, 0.0, 0.0],
            )
            .with_vector(
                "what is the weather like in Beijing today",
                vec![0.8, 0.0, 0.6, 0.0, 0.0, 0.0, 0.0, 0.0],
            )
            .with_vector(
                "book a flight to Beijing tomorrow",
                vec![0.65, 0.0, 0.76, 0.0, 0.0, 0.0, 0.0, 0.0],
            )
            .with_vector("convert 10 USD to EUR", axis(5))
    }

    fn weather_route() -> Route {
        Route {
            id: 0,
            name: "weather".to_string(),
            description: String::new(),
            utterances: vec![
                "how is the weather in Beijing".to_string(),
                "tomorrow's forecast".to_string(),
            ],
            negative_samples: Vec::new(),
            score_threshold: 0.6,
            negative_threshold: 0.95,
        }
    }

    async fn build(
        routes: Vec<Route>,
        embedder: MockEmbedder,
    ) -> (TempDir, RouteStore, Predictor) {
        let temp = TempDir::new().unwrap();
        let store = RouteStore::open(&temp.path().join("routes.json")).unwrap();
        for route in routes {
            store.create(route).unwrap();
        }

        let embedder = Arc::new(embedder);
        let index = Arc::new(MemoryIndex::new(DIM));
        Synchronizer::new(embedder.clone(), index.clone(), 8)
            .sync(&store, SyncMode::Incremental, &CancelToken::new())
            .await
            .unwrap();

        (temp, store, Predictor::new(embedder, index))
    }

    #[tokio::test]
    async fn test_happy_path_returns_weather_first() {
        let (_t, store, predictor) = build(vec![weather_route()], scripted_embedder()).await;

        let result = predictor
            .predict(&store, "what is the weather like in Beijing today")
            .await
            .unwrap();

        assert_eq!(result[0].name, "weather");
        assert!(result[0].score.unwrap() >= 0.6);
    }

    #[tokio::test]
    async fn test_fallback_on_no_match() {
        let (_t, store, predictor) = build(vec![weather_route()], scripted_embedder()).await;

        let result = predictor
            .predict(&store, "convert 10 USD to EUR")
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 0);
        assert_eq!(result[0].name, "none");
        assert_eq!(result[0].score, None);
    }

    #[tokio::test]
    async fn test_fallback_on_empty_store() {
        let (_t, store, predictor) = build(vec![], scripted_embedder()).await;

        let result = predictor.predict(&store, "anything at all").await.unwrap();
        assert_eq!(result, vec![Prediction { id: 0, name: "none".into(), score: None }]);
    }

    #[tokio::test]
    async fn test_negative_veto_suppresses_route() {
        let mut route = weather_route();
        route.negative_samples = vec!["book a flight to Beijing".to_string()];
        route.negative_threshold = 0.85;

        let (_t, store, predictor) = build(vec![route], scripted_embedder()).await;

        // The query scores 0.95 against the negative sample axis and would
        // otherwise clear the positive threshold via its weather component.
        let result = predictor
            .predict(&store, "book a flight to Beijing tomorrow")
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 0);
    }

    #[tokio::test]
    async fn test_lowering_threshold_admits_route() {
        let mut strict = weather_route();
        strict.score_threshold = 0.95;
        let (_t, store, predictor) = build(vec![strict], scripted_embedder()).await;

        let query = "what is the weather like in Beijing today";
        let result = predictor.predict(&store, query).await.unwrap();
        assert_eq!(result[0].id, 0);

        let mut relaxed = store.get(1).unwrap();
        relaxed.score_threshold = 0.5;
        store.update(1, relaxed).unwrap();

        let result = predictor.predict(&store, query).await.unwrap();
        assert_eq!(result[0].name, "weather");
    }

    #[tokio::test]
    async fn test_equal_scores_tie_break_by_id() {
        let shared = "identical utterance";
        let embedder = MockEmbedder::new(DIM).with_vector(shared, axis(3));

        let make = |name: &str| Route {
            id: 0,
            name: name.to_string(),
            description: String::new(),
            utterances: vec![shared.to_string()],
            negative_samples: Vec::new(),
            score_threshold: 0.5,
            negative_threshold: 0.95,
        };

        // Identical utterances on both routes collide on the same point id,
        // so give each route its own text mapping to the same vector.
        let embedder = embedder.with_vector("identical utterance b", axis(3));
        let mut second = make("second");
        second.utterances = vec!["identical utterance b".to_string()];

        let (_t, store, predictor) = build(vec![make("first"), second], embedder).await;

        let result = predictor.predict(&store, shared).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, 1);
        assert_eq!(result[1].id, 2);
        assert_eq!(result[0].score, result[1].score);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (_t, store, predictor) = build(vec![weather_route()], scripted_embedder()).await;
        let err = predictor.predict(&store, "   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_prediction_is_deterministic() {
        let (_t, store, predictor) = build(vec![weather_route()], scripted_embedder()).await;

        let query = "what is the weather like in Beijing today";
        let first = predictor.predict(&store, query).await.unwrap();
        let second = predictor.predict(&store, query).await.unwrap();
        assert_eq!(first, second);
    }
}
