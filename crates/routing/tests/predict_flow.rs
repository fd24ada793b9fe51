//! End-to-end engine flow: create routes, sync, predict, veto, repair.

use std::sync::Arc;

use tempfile::TempDir;

use intent_routing::cancel::CancelToken;
use intent_routing::diagnostics::DiagnosticsEngine;
use intent_routing::embeddings::providers::MockEmbedder;
use intent_routing::index::memory::MemoryIndex;
use intent_routing::predict::Predictor;
use intent_routing::store::RouteStore;
use intent_routing::sync::{SyncMode, Synchronizer};
use intent_routing::types::Route;
use intent_routing::VectorIndex;

const DIM: usize = 8;

struct Harness {
    _temp: TempDir,
    store: RouteStore,
    index: Arc<dyn VectorIndex>,
    sync: Synchronizer,
    predictor: Predictor,
    diagnostics: DiagnosticsEngine,
}

fn embedder() -> MockEmbedder {
    MockEmbedder::new(DIM)
        // weather cluster on axis 0
        .with_vector("how is the weather in Beijing", vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
        .with_vector("tomorrow's forecast", vec![0.95, 0.31, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
        .with_vector(
            "what is the weather like in Beijing today",
            vec![0.9, 0.1, 0.42, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
        // flight intent leans on axis 2 but keeps a weather component
        .with_vector("book a flight to Beijing", vec![0.62, 0.0, 0.78, 0.0, 0.0, 0.0, 0.0, 0.0])
        .with_vector(
            "book a flight to Beijing tomorrow",
            vec![0.65, 0.0, 0.76, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
        // train/flight booking share a near-identical ticket utterance
        .with_vector("book a ticket to Shanghai", vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0])
        .with_vector("ticket to Shanghai please", vec![0.0, 0.0, 0.0, 0.99, 0.14, 0.0, 0.0, 0.0])
        .with_vector("book my train ride", vec![0.0, 0.0, 0.0, 0.3, 0.0, 0.95, 0.0, 0.0])
        .with_vector("convert 10 USD to EUR", vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0])
}

async fn harness() -> Harness {
    let temp = TempDir::new().unwrap();
    let store = RouteStore::open(&temp.path().join("routes.json")).unwrap();

    let embedder = Arc::new(embedder());
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(DIM));

    Harness {
        _temp: temp,
        store,
        index: Arc::clone(&index),
        sync: Synchronizer::new(embedder.clone(), Arc::clone(&index), 8),
        predictor: Predictor::new(embedder, Arc::clone(&index)),
        diagnostics: DiagnosticsEngine::new(index, 0.85, 0.92),
    }
}

fn weather_route() -> Route {
    Route {
        id: 0,
        name: "weather".to_string(),
        description: "weather questions".to_string(),
        utterances: vec![
            "how is the weather in Beijing".to_string(),
            "tomorrow's forecast".to_string(),
        ],
        negative_samples: Vec::new(),
        score_threshold: 0.6,
        negative_threshold: 0.95,
    }
}

async fn reindex(h: &Harness) {
    h.sync
        .sync(&h.store, SyncMode::Incremental, &CancelToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn create_and_predict_happy_path() {
    let h = harness().await;
    h.store.create(weather_route()).unwrap();
    reindex(&h).await;

    let result = h
        .predictor
        .predict(&h.store, "what is the weather like in Beijing today")
        .await
        .unwrap();

    assert_eq!(result[0].name, "weather");
    assert!(result[0].score.unwrap() >= 0.6);
}

#[tokio::test]
async fn negative_veto_flow() {
    let h = harness().await;
    let created = h.store.create(weather_route()).unwrap();

    // Without the counter-example the flight query leaks into weather.
    reindex(&h).await;
    let before = h
        .predictor
        .predict(&h.store, "book a flight to Beijing tomorrow")
        .await
        .unwrap();
    assert_eq!(before[0].name, "weather");

    h.store
        .replace_negative_samples(
            created.id,
            vec!["book a flight to Beijing".to_string()],
            Some(0.85),
        )
        .unwrap();
    reindex(&h).await;

    let after = h
        .predictor
        .predict(&h.store, "book a flight to Beijing tomorrow")
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, 0);
    assert_eq!(after[0].name, "none");
    assert_eq!(after[0].score, None);
}

#[tokio::test]
async fn unrelated_query_falls_back() {
    let h = harness().await;
    h.store.create(weather_route()).unwrap();
    reindex(&h).await;

    let result = h
        .predictor
        .predict(&h.store, "convert 10 USD to EUR")
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].id, 0);
}

#[tokio::test]
async fn sync_after_delete_drops_points() {
    let h = harness().await;
    h.store.create(weather_route()).unwrap();
    let second = h
        .store
        .create(Route {
            id: 0,
            name: "currency".to_string(),
            description: String::new(),
            utterances: vec!["convert 10 USD to EUR".to_string()],
            negative_samples: Vec::new(),
            score_threshold: 0.75,
            negative_threshold: 0.95,
        })
        .unwrap();
    reindex(&h).await;

    h.store.delete(second.id).unwrap();
    let report = h
        .sync
        .sync(&h.store, SyncMode::Incremental, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.total_points, 2);
    assert!(h.index.ids_by_route(second.id).await.unwrap().is_empty());
    assert_eq!(h.index.count().await.unwrap(), 2);
}

#[tokio::test]
async fn overlap_detected_then_repaired() {
    let h = harness().await;
    // Both routes contain the exact same ticket utterance.
    h.store
        .create(Route {
            id: 0,
            name: "flight_booking".to_string(),
            description: String::new(),
            utterances: vec!["book a ticket to Shanghai".to_string()],
            negative_samples: Vec::new(),
            score_threshold: 0.75,
            negative_threshold: 0.95,
        })
        .unwrap();
    h.store
        .create(Route {
            id: 0,
            name: "train_booking".to_string(),
            description: String::new(),
            utterances: vec![
                "book a ticket to Shanghai".to_string(),
                "book my train ride".to_string(),
            ],
            negative_samples: Vec::new(),
            score_threshold: 0.75,
            negative_threshold: 0.95,
        })
        .unwrap();
    reindex(&h).await;

    let report = h
        .diagnostics
        .overlap(&h.store, true, &CancelToken::new())
        .await
        .unwrap();

    let flight = report
        .iter()
        .find(|r| r.route_name == "flight_booking")
        .expect("flight overlap reported");
    assert!(flight.overlaps[0].region_similarity >= 0.85);
    let conflict = &flight.overlaps[0].instance_conflicts[0];
    assert_eq!(conflict.source_utterance, "book a ticket to Shanghai");
    assert_eq!(conflict.target_utterance, "book a ticket to Shanghai");
    assert!(conflict.similarity >= 0.99);

    // Apply the repair: replace the conflicting line on the flight route.
    h.store
        .replace_utterances(1, vec!["book a flight to Beijing".to_string()])
        .unwrap();
    reindex(&h).await;

    let after = h
        .diagnostics
        .overlap(&h.store, true, &CancelToken::new())
        .await
        .unwrap();
    assert!(after.iter().all(|r| r.route_name != "flight_booking"));
}
