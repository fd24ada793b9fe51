//! Qdrant-backed vector index over the REST API.
//!
//! API reference: https://api.qdrant.tech

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use intent_core::{AppError, AppResult};

use crate::index::{PointFilter, VectorIndex};
use crate::types::{Point, PointPayload, SearchHit};

/// Per-request deadline for the vector database.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SCROLL_PAGE: usize = 256;

pub struct QdrantIndex {
    client: reqwest::Client,
    base: String,
    collection: String,
    api_key: Option<String>,
    dim: usize,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    payload: PointPayload,
}

#[derive(Debug, Deserialize)]
struct ScrolledPoint {
    id: Value,
    payload: PointPayload,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ScrolledPoint>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Debug, Serialize)]
struct WirePoint<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a PointPayload,
}

impl QdrantIndex {
    /// Connect and make sure the collection exists with the right
    /// dimension. A dimension mismatch (embedding model change) recreates
    /// the collection; the next forced-full sync repopulates it.
    pub async fn connect(
        url: &str,
        api_key: Option<&str>,
        collection: &str,
        dim: usize,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::backend("qdrant", e.to_string()))?;

        let index = Self {
            client,
            base: url.trim().trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            api_key: api_key.map(|k| k.to_string()),
            dim,
        };

        index.ensure_collection().await?;
        Ok(index)
    }

    async fn ensure_collection(&self) -> AppResult<()> {
        match self.collection_dim().await? {
            Some(existing) if existing == self.dim => {
                tracing::debug!("Collection '{}' already exists", self.collection);
            }
            Some(existing) => {
                tracing::warn!(
                    "Collection '{}' has dimension {} but embedder reports {}, recreating",
                    self.collection,
                    existing,
                    self.dim
                );
                self.send(Method::DELETE, &format!("/collections/{}", self.collection), None)
                    .await?;
                self.create_collection().await?;
            }
            None => {
                tracing::info!("Creating collection '{}'", self.collection);
                self.create_collection().await?;
            }
        }

        // Payload indexes speed up route-scoped filters and are required
        // by managed Qdrant deployments for filtered queries.
        for (field, schema) in [("route_id", "integer"), ("is_negative", "bool")] {
            let body = json!({ "field_name": field, "field_schema": schema });
            if let Err(e) = self
                .send(
                    Method::PUT,
                    &format!("/collections/{}/index", self.collection),
                    Some(body),
                )
                .await
            {
                // Index may already exist; anything else is reported on use.
                tracing::debug!("Payload index '{}' not created: {}", field, e);
            }
        }

        Ok(())
    }

    async fn create_collection(&self) -> AppResult<()> {
        let body = json!({
            "vectors": { "size": self.dim, "distance": "Cosine" }
        });
        self.send(
            Method::PUT,
            &format!("/collections/{}", self.collection),
            Some(body),
        )
        .await?;
        Ok(())
    }

    /// Existing collection's vector size, or `None` if it doesn't exist.
    async fn collection_dim(&self) -> AppResult<Option<usize>> {
        let response = self
            .request(Method::GET, &format!("/collections/{}", self.collection))
            .send()
            .await
            .map_err(|e| AppError::backend("qdrant", e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::backend(
                "qdrant",
                format!("HTTP {}: {}", status, detail),
            ));
        }

        let body: Envelope<Value> = response
            .json()
            .await
            .map_err(|e| AppError::backend("qdrant", e.to_string()))?;

        Ok(body
            .result
            .pointer("/config/params/vectors/size")
            .and_then(Value::as_u64)
            .map(|size| size as usize))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> AppResult<Value> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::backend("qdrant", e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::backend("qdrant", e.to_string()))?;

        if !status.is_success() {
            return Err(AppError::backend(
                "qdrant",
                format!("HTTP {}: {}", status, text),
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            AppError::backend("qdrant", format!("unparseable response: {}", e))
        })
    }

    async fn scroll_raw(
        &self,
        filter: &PointFilter,
        with_vectors: bool,
    ) -> AppResult<Vec<ScrolledPoint>> {
        let mut points = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": with_vectors,
            });
            if let Some(filter) = filter_to_json(filter) {
                body["filter"] = filter;
            }
            if let Some(offset) = offset.take() {
                body["offset"] = offset;
            }

            let raw = self
                .send(
                    Method::POST,
                    &format!("/collections/{}/points/scroll", self.collection),
                    Some(body),
                )
                .await?;

            let page: Envelope<ScrollResult> = serde_json::from_value(raw)
                .map_err(|e| AppError::backend("qdrant", format!("bad scroll page: {}", e)))?;

            points.extend(page.result.points);

            match page.result.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }

        Ok(points)
    }
}

/// Translate a point filter to Qdrant's filter DSL.
///
/// Positives are matched as `must_not is_negative = true` so points written
/// before the flag existed still count as positives.
fn filter_to_json(filter: &PointFilter) -> Option<Value> {
    let mut must = Vec::new();
    let mut must_not = Vec::new();

    if let Some(route_id) = filter.route_id {
        must.push(json!({ "key": "route_id", "match": { "value": route_id } }));
    }
    match filter.negatives {
        Some(true) => must.push(json!({ "key": "is_negative", "match": { "value": true } })),
        Some(false) => must_not.push(json!({ "key": "is_negative", "match": { "value": true } })),
        None => {}
    }

    if must.is_empty() && must_not.is_empty() {
        return None;
    }

    let mut out = serde_json::Map::new();
    if !must.is_empty() {
        out.insert("must".to_string(), Value::Array(must));
    }
    if !must_not.is_empty() {
        out.insert("must_not".to_string(), Value::Array(must_not));
    }
    Some(Value::Object(out))
}

fn parse_point_id(raw: &Value) -> AppResult<Uuid> {
    raw.as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::backend("qdrant", format!("unexpected point id: {}", raw)))
}

#[async_trait::async_trait]
impl VectorIndex for QdrantIndex {
    fn backend_name(&self) -> &str {
        "qdrant"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn healthy(&self) -> bool {
        matches!(self.collection_dim().await, Ok(Some(_)))
    }

    async fn upsert(&self, points: Vec<Point>) -> AppResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        for point in &points {
            if point.vector.len() != self.dim {
                return Err(AppError::backend(
                    "qdrant",
                    format!(
                        "vector dimension {} does not match collection dimension {}",
                        point.vector.len(),
                        self.dim
                    ),
                ));
            }
        }

        let wire: Vec<WirePoint> = points
            .iter()
            .map(|point| WirePoint {
                id: point.id.to_string(),
                vector: &point.vector,
                payload: &point.payload,
            })
            .collect();

        self.send(
            Method::PUT,
            &format!("/collections/{}/points?wait=true", self.collection),
            Some(json!({ "points": wire })),
        )
        .await?;
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.send(
            Method::POST,
            &format!("/collections/{}/points/delete?wait=true", self.collection),
            Some(json!({ "points": ids })),
        )
        .await?;
        Ok(())
    }

    async fn delete_by_route(&self, route_id: i64) -> AppResult<()> {
        let filter = filter_to_json(&PointFilter {
            route_id: Some(route_id),
            negatives: None,
        });
        self.send(
            Method::POST,
            &format!("/collections/{}/points/delete?wait=true", self.collection),
            Some(json!({ "filter": filter })),
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &PointFilter,
    ) -> AppResult<Vec<SearchHit>> {
        let mut body = json!({
            "vector": vector,
            "limit": k,
            "with_payload": true,
        });
        if let Some(filter) = filter_to_json(filter) {
            body["filter"] = filter;
        }

        let raw = self
            .send(
                Method::POST,
                &format!("/collections/{}/points/search", self.collection),
                Some(body),
            )
            .await?;

        let parsed: Envelope<Vec<ScoredPoint>> = serde_json::from_value(raw)
            .map_err(|e| AppError::backend("qdrant", format!("bad search result: {}", e)))?;

        let mut hits = Vec::with_capacity(parsed.result.len());
        for scored in parsed.result {
            hits.push(SearchHit {
                id: parse_point_id(&scored.id)?,
                score: scored.score,
                payload: scored.payload,
            });
        }
        Ok(hits)
    }

    async fn scroll(&self, filter: &PointFilter) -> AppResult<Vec<Point>> {
        let raw = self.scroll_raw(filter, true).await?;

        let mut points = Vec::with_capacity(raw.len());
        for scrolled in raw {
            points.push(Point {
                id: parse_point_id(&scrolled.id)?,
                vector: scrolled.vector.unwrap_or_default(),
                payload: scrolled.payload,
            });
        }
        points.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(points)
    }

    async fn all_ids_with_payload(&self) -> AppResult<HashMap<Uuid, PointPayload>> {
        let raw = self.scroll_raw(&PointFilter::any(), false).await?;

        let mut map = HashMap::with_capacity(raw.len());
        for scrolled in raw {
            map.insert(parse_point_id(&scrolled.id)?, scrolled.payload);
        }
        Ok(map)
    }

    async fn ids_by_route(&self, route_id: i64) -> AppResult<HashSet<Uuid>> {
        let filter = PointFilter {
            route_id: Some(route_id),
            negatives: None,
        };
        let raw = self.scroll_raw(&filter, false).await?;

        let mut ids = HashSet::with_capacity(raw.len());
        for scrolled in raw {
            ids.insert(parse_point_id(&scrolled.id)?);
        }
        Ok(ids)
    }

    async fn count(&self) -> AppResult<usize> {
        let raw = self
            .send(
                Method::POST,
                &format!("/collections/{}/points/count", self.collection),
                Some(json!({ "exact": true })),
            )
            .await?;

        let parsed: Envelope<CountResult> = serde_json::from_value(raw)
            .map_err(|e| AppError::backend("qdrant", format!("bad count result: {}", e)))?;
        Ok(parsed.result.count)
    }

    async fn reset(&self) -> AppResult<()> {
        self.send(
            Method::DELETE,
            &format!("/collections/{}", self.collection),
            None,
        )
        .await?;
        self.ensure_collection().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_translation_empty() {
        assert!(filter_to_json(&PointFilter::any()).is_none());
    }

    #[test]
    fn test_filter_translation_positives_of_route() {
        let filter = filter_to_json(&PointFilter::positives_of(3)).unwrap();
        assert_eq!(filter["must"][0]["key"], "route_id");
        assert_eq!(filter["must"][0]["match"]["value"], 3);
        assert_eq!(filter["must_not"][0]["key"], "is_negative");
    }

    #[test]
    fn test_filter_translation_negatives() {
        let filter = filter_to_json(&PointFilter {
            route_id: None,
            negatives: Some(true),
        })
        .unwrap();
        assert_eq!(filter["must"][0]["key"], "is_negative");
        assert!(filter.get("must_not").is_none());
    }

    #[test]
    fn test_point_id_parsing() {
        let id = Uuid::new_v4();
        let parsed = parse_point_id(&Value::String(id.to_string())).unwrap();
        assert_eq!(parsed, id);

        assert!(parse_point_id(&serde_json::json!(42)).is_err());
    }
}
