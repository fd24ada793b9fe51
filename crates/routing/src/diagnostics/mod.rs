//! Overlap diagnostics.
//!
//! For every ordered pair of routes the engine computes a region
//! similarity (how much of one route's core sits inside the other's
//! utterance cloud) and enumerates instance-level conflicts (specific
//! cross-route utterance pairs too similar to disambiguate). Results are
//! cached against the route store's version counter; any write invalidates
//! the cache lazily on the next read.

pub mod projection;

use std::sync::{Arc, Mutex};

use intent_core::{AppError, AppResult};

use crate::cancel::CancelToken;
use crate::embeddings::cosine_similarity;
use crate::index::{PointFilter, VectorIndex};
use crate::store::RouteStore;
use crate::types::{
    ConflictPoint, ProjectionMeta, ProjectionPoint, ProjectionReport, RouteDiagnostics,
    RouteOverlap,
};

/// How many of a route's utterances (ranked by centroid proximity) define
/// its region. Small routes use all of them.
const TOP_M: usize = 8;

/// Instance conflict lists are capped per ordered pair.
const MAX_CONFLICTS_PER_PAIR: usize = 10;

pub struct DiagnosticsEngine {
    index: Arc<dyn VectorIndex>,
    region_threshold: f32,
    instance_threshold: f32,
    cache: Mutex<Option<OverlapCache>>,
}

struct OverlapCache {
    version: u64,
    report: Vec<RouteDiagnostics>,
}

/// Per-route vector bundle used during an overlap sweep.
struct RouteRegion {
    id: i64,
    name: String,
    utterances: Vec<String>,
    vectors: Vec<Vec<f32>>,
    /// Indices of the top-M utterances by centroid proximity.
    core: Vec<usize>,
}

impl DiagnosticsEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        region_threshold: f32,
        instance_threshold: f32,
    ) -> Self {
        Self {
            index,
            region_threshold,
            instance_threshold,
            cache: Mutex::new(None),
        }
    }

    /// Full overlap report for every stored route.
    ///
    /// `refresh = false` serves the cached report when it matches the
    /// current store version; `refresh = true` always recomputes. Routes
    /// without overlaps are omitted; a significant pair appears under both
    /// of its routes with the same region score.
    pub async fn overlap(
        &self,
        store: &RouteStore,
        refresh: bool,
        cancel: &CancelToken,
    ) -> AppResult<Vec<RouteDiagnostics>> {
        let version = store.version();

        if !refresh {
            if let Some(cached) = self.cached_report(version) {
                tracing::debug!("Serving cached overlap report (version {})", version);
                return Ok(cached);
            }
        }

        let regions = self.load_regions(store, cancel).await?;
        let mut per_route: Vec<Vec<RouteOverlap>> = vec![Vec::new(); regions.len()];

        for i in 0..regions.len() {
            cancel.check()?;
            for j in (i + 1)..regions.len() {
                let a = &regions[i];
                let b = &regions[j];

                let pair_score = region_similarity(a, b).max(region_similarity(b, a));
                if pair_score < self.region_threshold {
                    continue;
                }

                per_route[i].push(RouteOverlap {
                    target_route_id: b.id,
                    target_route_name: b.name.clone(),
                    region_similarity: pair_score,
                    instance_conflicts: self.instance_conflicts(a, b),
                });
                per_route[j].push(RouteOverlap {
                    target_route_id: a.id,
                    target_route_name: a.name.clone(),
                    region_similarity: pair_score,
                    instance_conflicts: self.instance_conflicts(b, a),
                });
            }
        }

        let mut report = Vec::new();
        for (region, mut overlaps) in regions.iter().zip(per_route) {
            if overlaps.is_empty() {
                continue;
            }
            overlaps.sort_by(|x, y| {
                y.region_similarity
                    .partial_cmp(&x.region_similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| x.target_route_id.cmp(&y.target_route_id))
            });
            report.push(RouteDiagnostics {
                route_id: region.id,
                route_name: region.name.clone(),
                overlaps,
            });
        }

        // Cache only if no write landed while we were computing.
        if store.version() == version {
            if let Ok(mut cache) = self.cache.lock() {
                *cache = Some(OverlapCache {
                    version,
                    report: report.clone(),
                });
            }
        }

        tracing::info!(
            "Overlap analysis: {} route(s) with significant overlaps",
            report.len()
        );
        Ok(report)
    }

    /// Region score and directed conflicts for one route pair, computed
    /// fresh. Feeds repair suggestions.
    pub async fn analyze_pair(
        &self,
        store: &RouteStore,
        source_id: i64,
        target_id: i64,
    ) -> AppResult<(f32, Vec<ConflictPoint>)> {
        if source_id == target_id {
            return Err(AppError::Validation(
                "Source and target route must differ".to_string(),
            ));
        }

        let source = self.load_region(store, source_id).await?;
        let target = self.load_region(store, target_id).await?;

        let pair_score = region_similarity(&source, &target).max(region_similarity(&target, &source));
        Ok((pair_score, self.instance_conflicts(&source, &target)))
    }

    /// Project every utterance vector to 2-D for visualization.
    ///
    /// Deterministic given `(index contents, n_neighbors, min_dist, seed)`:
    /// points enter the layout in `(route_id, utterance)` order.
    pub async fn project(
        &self,
        n_neighbors: usize,
        min_dist: f32,
        seed: u64,
    ) -> AppResult<ProjectionReport> {
        let mut points = self.index.scroll(&PointFilter::positives()).await?;
        points.sort_by(|a, b| {
            (a.payload.route_id, &a.payload.utterance).cmp(&(b.payload.route_id, &b.payload.utterance))
        });

        let vectors: Vec<&[f32]> = points.iter().map(|p| p.vector.as_slice()).collect();
        let layout = projection::project(&vectors, n_neighbors, min_dist, seed);

        let out: Vec<ProjectionPoint> = points
            .iter()
            .zip(layout)
            .map(|(point, (x, y))| ProjectionPoint {
                x,
                y,
                route_id: point.payload.route_id,
                route_name: point.payload.route_name.clone(),
                utterance: point.payload.utterance.clone(),
            })
            .collect();

        Ok(ProjectionReport {
            meta: ProjectionMeta {
                n_points: out.len(),
                n_neighbors,
                min_dist,
            },
            points: out,
        })
    }

    fn cached_report(&self, version: u64) -> Option<Vec<RouteDiagnostics>> {
        let cache = self.cache.lock().ok()?;
        cache
            .as_ref()
            .filter(|c| c.version == version)
            .map(|c| c.report.clone())
    }

    async fn load_regions(
        &self,
        store: &RouteStore,
        cancel: &CancelToken,
    ) -> AppResult<Vec<RouteRegion>> {
        let mut regions = Vec::new();
        for route in store.list() {
            cancel.check()?;
            if let Some(region) = self.region_of(route.id, &route.name).await? {
                regions.push(region);
            }
        }
        Ok(regions)
    }

    async fn load_region(&self, store: &RouteStore, route_id: i64) -> AppResult<RouteRegion> {
        let route = store
            .get(route_id)
            .ok_or_else(|| AppError::NotFound(format!("Route {} does not exist", route_id)))?;
        self.region_of(route.id, &route.name).await?.ok_or_else(|| {
            AppError::Validation(format!(
                "Route {} has no indexed utterances; run a reindex first",
                route_id
            ))
        })
    }

    async fn region_of(&self, route_id: i64, name: &str) -> AppResult<Option<RouteRegion>> {
        let mut points = self
            .index
            .scroll(&PointFilter::positives_of(route_id))
            .await?;
        if points.is_empty() {
            return Ok(None);
        }
        points.sort_by(|a, b| a.payload.utterance.cmp(&b.payload.utterance));

        let utterances: Vec<String> = points.iter().map(|p| p.payload.utterance.clone()).collect();
        let vectors: Vec<Vec<f32>> = points.into_iter().map(|p| p.vector).collect();

        let centroid = centroid(&vectors);
        let mut ranked: Vec<usize> = (0..vectors.len()).collect();
        ranked.sort_by(|&x, &y| {
            let sx = cosine_similarity(&vectors[x], &centroid);
            let sy = cosine_similarity(&vectors[y], &centroid);
            sy.partial_cmp(&sx).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(TOP_M.min(vectors.len()));

        Ok(Some(RouteRegion {
            id: route_id,
            name: name.to_string(),
            utterances,
            vectors,
            core: ranked,
        }))
    }

    /// Cross pairs above the ambiguity threshold, one nearest target per
    /// source utterance, best first, capped.
    fn instance_conflicts(&self, source: &RouteRegion, target: &RouteRegion) -> Vec<ConflictPoint> {
        let mut conflicts = Vec::new();

        for (i, vector) in source.vectors.iter().enumerate() {
            let mut best: Option<(usize, f32)> = None;
            for (j, other) in target.vectors.iter().enumerate() {
                let sim = cosine_similarity(vector, other);
                if best.map_or(true, |(_, s)| sim > s) {
                    best = Some((j, sim));
                }
            }
            if let Some((j, sim)) = best {
                if sim >= self.instance_threshold {
                    conflicts.push(ConflictPoint {
                        source_utterance: source.utterances[i].clone(),
                        target_utterance: target.utterances[j].clone(),
                        similarity: sim,
                    });
                }
            }
        }

        conflicts.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_utterance.cmp(&b.source_utterance))
        });
        conflicts.truncate(MAX_CONFLICTS_PER_PAIR);
        conflicts
    }
}

/// Mean of the top-M core utterances' best similarity into the target set.
fn region_similarity(source: &RouteRegion, target: &RouteRegion) -> f32 {
    if source.core.is_empty() || target.vectors.is_empty() {
        return 0.0;
    }

    let total: f32 = source
        .core
        .iter()
        .map(|&i| {
            target
                .vectors
                .iter()
                .map(|v| cosine_similarity(&source.vectors[i], v))
                .fold(f32::MIN, f32::max)
        })
        .sum();
    total / source.core.len() as f32
}

fn centroid(vectors: &[Vec<f32>]) -> Vec<f32> {
    let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
    let mut mean = vec![0.0f32; dim];
    for vector in vectors {
        for (slot, value) in mean.iter_mut().zip(vector) {
            *slot += value;
        }
    }
    let n = vectors.len() as f32;
    for slot in &mut mean {
        *slot /= n;
    }
    mean
}
