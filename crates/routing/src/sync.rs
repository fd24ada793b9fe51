//! Incremental synchronization between the route store and vector index.
//!
//! The synchronizer diffs the expected point set (derived from the store)
//! against the ids actually present in the index, embeds and upserts what
//! is missing, and deletes orphans last. It is idempotent: running it twice
//! back-to-back performs no work on the second run.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use intent_core::{AppError, AppResult};

use crate::cancel::CancelToken;
use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::point::{negative_point_id, positive_point_id};
use crate::store::RouteStore;
use crate::types::{Point, PointPayload};

/// Synchronization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Upsert only what the diff says is missing. Default after any write.
    Incremental,
    /// Re-embed and upsert every expected point. Used when the embedding
    /// model changes or the operator suspects index drift.
    ForcedFull,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Incremental => write!(f, "incremental"),
            SyncMode::ForcedFull => write!(f, "forced_full"),
        }
    }
}

/// Observable outcome of a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub routes_count: usize,
    /// Utterance points expected after the run; equals the sum of
    /// `|route.utterances|` over all stored routes.
    pub total_points: usize,
    pub total_negative_points: usize,
    pub mode: SyncMode,
    pub upserted: usize,
    pub deleted: usize,
}

pub struct Synchronizer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    /// Sync runs are serialized; adjacent write-triggered runs coalesce
    /// behind this lock and converge because the diff is idempotent.
    run_lock: tokio::sync::Mutex<()>,
}

impl Synchronizer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            batch_size: batch_size.max(1),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Reconcile the index with the store.
    ///
    /// On an embedding failure mid-run the call aborts with the index in a
    /// partial state and no deletes applied; the next run converges.
    pub async fn sync(
        &self,
        store: &RouteStore,
        mode: SyncMode,
        cancel: &CancelToken,
    ) -> AppResult<SyncReport> {
        let _run = self.run_lock.lock().await;
        cancel.check()?;

        let routes = store.list();
        let expected = expected_points(store);
        let actual = self.index.all_ids_with_payload().await?;

        let to_delete: Vec<Uuid> = actual
            .keys()
            .filter(|id| !expected.contains_key(id))
            .copied()
            .collect();

        let mut to_upsert: Vec<(Uuid, PointPayload)> = expected
            .into_iter()
            .filter(|(id, _)| mode == SyncMode::ForcedFull || !actual.contains_key(id))
            .collect();
        // Deterministic batch composition regardless of map iteration order.
        to_upsert.sort_by(|a, b| {
            let ka = (&a.1.route_id, a.1.is_negative, &a.1.utterance);
            let kb = (&b.1.route_id, b.1.is_negative, &b.1.utterance);
            ka.cmp(&kb)
        });

        tracing::info!(
            "Sync ({}): {} route(s), {} upsert(s), {} delete(s) pending",
            mode,
            routes.len(),
            to_upsert.len(),
            to_delete.len()
        );

        let mut upserted = 0;
        for batch in to_upsert.chunks(self.batch_size) {
            cancel.check()?;

            let texts: Vec<String> = batch.iter().map(|(_, p)| p.utterance.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(AppError::backend(
                    self.embedder.provider_name(),
                    format!("asked for {} embeddings, got {}", batch.len(), vectors.len()),
                ));
            }

            let points: Vec<Point> = batch
                .iter()
                .zip(vectors)
                .map(|((id, payload), vector)| Point {
                    id: *id,
                    vector,
                    payload: payload.clone(),
                })
                .collect();

            self.index.upsert(points).await?;
            upserted += batch.len();
        }

        // Deletes run last so an aborted run never drops points the diff
        // still considered orphaned against a partially-updated index.
        cancel.check()?;
        self.index.delete_by_ids(&to_delete).await?;

        let report = SyncReport {
            routes_count: routes.len(),
            total_points: routes.iter().map(|r| r.utterances.len()).sum(),
            total_negative_points: routes.iter().map(|r| r.negative_samples.len()).sum(),
            mode,
            upserted,
            deleted: to_delete.len(),
        };

        tracing::info!(
            "Sync complete ({}): {} route(s), {} point(s), {} upserted, {} deleted",
            report.mode,
            report.routes_count,
            report.total_points,
            report.upserted,
            report.deleted
        );
        Ok(report)
    }
}

/// The point set the index must hold for the current store snapshot:
/// one point per utterance and one per negative sample.
fn expected_points(store: &RouteStore) -> HashMap<Uuid, PointPayload> {
    let mut expected = HashMap::new();

    for route in store.list() {
        for utterance in &route.utterances {
            expected.insert(
                positive_point_id(route.id, utterance),
                PointPayload {
                    route_id: route.id,
                    route_name: route.name.clone(),
                    utterance: utterance.clone(),
                    is_negative: false,
                    score_threshold: route.score_threshold,
                    negative_threshold: route.negative_threshold,
                },
            );
        }
        for sample in &route.negative_samples {
            expected.insert(
                negative_point_id(route.id, sample),
                PointPayload {
                    route_id: route.id,
                    route_name: route.name.clone(),
                    utterance: sample.clone(),
                    is_negative: true,
                    score_threshold: route.score_threshold,
                    negative_threshold: route.negative_threshold,
                },
            );
        }
    }

    expected
}
