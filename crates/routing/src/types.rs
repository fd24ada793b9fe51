//! Route, point and prediction type definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use intent_core::{AppError, AppResult};

/// A named intent class with example utterances and optional
/// counter-examples.
///
/// `id == 0` is reserved for the synthetic fallback route and is never
/// stored; create requests use it to ask for auto-assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: i64,

    pub name: String,

    /// Free text, used only as LLM context.
    #[serde(default)]
    pub description: String,

    /// Example utterances. Order is preserved for display only.
    pub utterances: Vec<String>,

    /// Counter-examples: queries that must never select this route.
    #[serde(default)]
    pub negative_samples: Vec<String>,

    /// Minimum similarity for this route to be admitted.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// If any negative sample is at least this similar to the query, the
    /// route is vetoed regardless of its positive score.
    #[serde(default = "default_negative_threshold")]
    pub negative_threshold: f32,
}

pub fn default_score_threshold() -> f32 {
    0.75
}

pub fn default_negative_threshold() -> f32 {
    0.95
}

impl Route {
    /// Check the structural invariants of a route about to be stored.
    ///
    /// The id itself is not checked here; the store enforces non-zero ids
    /// after auto-assignment.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Route name must not be empty".into()));
        }

        check_distinct_non_empty("utterances", &self.utterances)?;
        check_distinct_non_empty("negative_samples", &self.negative_samples)?;

        for sample in &self.negative_samples {
            if self.utterances.contains(sample) {
                return Err(AppError::Validation(format!(
                    "'{}' appears in both utterances and negative_samples",
                    sample
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(AppError::Validation(format!(
                "score_threshold must be in [0, 1], got {}",
                self.score_threshold
            )));
        }

        if !(0.8..=1.0).contains(&self.negative_threshold) {
            return Err(AppError::Validation(format!(
                "negative_threshold must be in [0.8, 1], got {}",
                self.negative_threshold
            )));
        }

        Ok(())
    }
}

fn check_distinct_non_empty(field: &str, values: &[String]) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();
    for value in values {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "{} must not contain empty strings",
                field
            )));
        }
        if !seen.insert(value.as_str()) {
            return Err(AppError::Validation(format!(
                "{} contains duplicate entry '{}'",
                field, value
            )));
        }
    }
    Ok(())
}

/// One admitted route in a prediction result. `score` is `None` only for
/// the synthetic fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub id: i64,
    pub name: String,
    pub score: Option<f32>,
}

/// Payload stored with every vector point.
///
/// `route_id` and `utterance` define point identity; the remaining fields
/// make hits self-describing so log lines and payload-level fallbacks
/// don't need a store lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointPayload {
    pub route_id: i64,
    pub route_name: String,
    pub utterance: String,
    #[serde(default)]
    pub is_negative: bool,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_negative_threshold")]
    pub negative_threshold: f32,
}

/// A vector point as stored in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A single nearest-neighbor search result, highest score first.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: PointPayload,
}

/// A pair of cross-route utterances too similar to disambiguate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictPoint {
    pub source_utterance: String,
    pub target_utterance: String,
    pub similarity: f32,
}

/// Overlap of one route against a specific other route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteOverlap {
    pub target_route_id: i64,
    pub target_route_name: String,
    pub region_similarity: f32,
    #[serde(default)]
    pub instance_conflicts: Vec<ConflictPoint>,
}

/// All overlaps found for one source route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteDiagnostics {
    pub route_id: i64,
    pub route_name: String,
    #[serde(default)]
    pub overlaps: Vec<RouteOverlap>,
}

/// One utterance vector projected to 2-D for visualization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub x: f32,
    pub y: f32,
    pub route_id: i64,
    pub route_name: String,
    pub utterance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionMeta {
    pub n_points: usize,
    pub n_neighbors: usize,
    pub min_dist: f32,
}

/// Full projection report returned by the diagnostics engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionReport {
    pub points: Vec<ProjectionPoint>,
    pub meta: ProjectionMeta,
}
