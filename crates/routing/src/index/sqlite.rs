//! SQLite-backed vector index.
//!
//! Single-file embedded backend: vectors are stored as little-endian f32
//! blobs and search is a brute-force cosine scan. Adequate for route
//! corpora (hundreds to low thousands of points) without any external
//! infrastructure.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use uuid::Uuid;

use intent_core::{AppError, AppResult};

use crate::embeddings::cosine_similarity;
use crate::index::{PointFilter, VectorIndex};
use crate::types::{Point, PointPayload, SearchHit};

pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
    dim: usize,
}

impl SqliteIndex {
    /// Open or create the index file.
    ///
    /// A stored dimension that differs from `dim` (embedding model change)
    /// clears the points; the next forced-full sync repopulates them.
    pub async fn open(path: &Path, dim: usize) -> AppResult<Self> {
        let path = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> AppResult<Connection> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let conn = Connection::open(&path)
                .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?;

            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS points (
                    id TEXT PRIMARY KEY,
                    route_id INTEGER NOT NULL,
                    route_name TEXT NOT NULL,
                    utterance TEXT NOT NULL,
                    is_negative INTEGER NOT NULL DEFAULT 0,
                    score_threshold REAL NOT NULL,
                    negative_threshold REAL NOT NULL,
                    vector BLOB NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_points_route ON points(route_id);

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                "#,
            )
            .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?;

            Ok(conn)
        })
        .await
        .map_err(|e| AppError::backend("sqlite-index", e.to_string()))??;

        let index = Self {
            conn: Arc::new(Mutex::new(conn)),
            dim,
        };

        let stored_dim: Option<String> = index
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT value FROM meta WHERE key = 'dim'",
                    [],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(AppError::backend("sqlite-index", other.to_string())),
                })
            })
            .await?;

        match stored_dim {
            Some(stored) if stored != dim.to_string() => {
                tracing::warn!(
                    "Index dimension changed ({} -> {}), clearing stored points",
                    stored,
                    dim
                );
                index.reset().await?;
            }
            Some(_) => {}
            None => {
                index
                    .with_conn(move |conn| {
                        conn.execute(
                            "INSERT OR REPLACE INTO meta (key, value) VALUES ('dim', ?1)",
                            params![dim.to_string()],
                        )
                        .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?;
                        Ok(())
                    })
                    .await?;
            }
        }

        Ok(index)
    }

    async fn with_conn<T, F>(&self, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AppError::backend("sqlite-index", "poisoned lock"))?;
            op(&guard)
        })
        .await
        .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?
    }

    async fn load_points(&self, filter: &PointFilter) -> AppResult<Vec<Point>> {
        let (clause, bindings) = filter_clause(filter);
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT id, route_id, route_name, utterance, is_negative, \
                 score_threshold, negative_threshold, vector FROM points{} ORDER BY id",
                clause
            );
            let mut stmt = stmt(conn, &sql)?;

            let rows = stmt
                .query_map(rusqlite::params_from_iter(bindings), row_to_point)
                .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?;

            let mut points = Vec::new();
            for row in rows {
                points.push(row.map_err(|e| AppError::backend("sqlite-index", e.to_string()))??);
            }
            Ok(points)
        })
        .await
    }
}

fn stmt<'c>(conn: &'c Connection, sql: &str) -> AppResult<rusqlite::Statement<'c>> {
    conn.prepare(sql)
        .map_err(|e| AppError::backend("sqlite-index", e.to_string()))
}

/// Build a WHERE clause and its bindings from a point filter.
fn filter_clause(filter: &PointFilter) -> (String, Vec<rusqlite::types::Value>) {
    let mut conditions = Vec::new();
    let mut bindings: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(route_id) = filter.route_id {
        conditions.push("route_id = ?".to_string());
        bindings.push(route_id.into());
    }
    if let Some(negatives) = filter.negatives {
        conditions.push("is_negative = ?".to_string());
        bindings.push((negatives as i64).into());
    }

    if conditions.is_empty() {
        (String::new(), bindings)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), bindings)
    }
}

type PointRow = AppResult<Point>;

fn row_to_point(row: &rusqlite::Row<'_>) -> rusqlite::Result<PointRow> {
    let id_text: String = row.get(0)?;
    let blob: Vec<u8> = row.get(7)?;

    Ok((|| {
        let id = Uuid::parse_str(&id_text)
            .map_err(|e| AppError::backend("sqlite-index", format!("bad point id: {}", e)))?;
        Ok(Point {
            id,
            vector: bytes_to_vector(&blob)?,
            payload: PointPayload {
                route_id: row.get(1).map_err(sql_err)?,
                route_name: row.get(2).map_err(sql_err)?,
                utterance: row.get(3).map_err(sql_err)?,
                is_negative: row.get::<_, i64>(4).map_err(sql_err)? != 0,
                score_threshold: row.get(5).map_err(sql_err)?,
                negative_threshold: row.get(6).map_err(sql_err)?,
            },
        })
    })())
}

fn sql_err(e: rusqlite::Error) -> AppError {
    AppError::backend("sqlite-index", e.to_string())
}

fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_vector(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::backend(
            "sqlite-index",
            "stored vector has invalid length",
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[async_trait::async_trait]
impl VectorIndex for SqliteIndex {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn healthy(&self) -> bool {
        self.count().await.is_ok()
    }

    async fn upsert(&self, points: Vec<Point>) -> AppResult<()> {
        for point in &points {
            if point.vector.len() != self.dim {
                return Err(AppError::backend(
                    "sqlite-index",
                    format!(
                        "vector dimension {} does not match index dimension {}",
                        point.vector.len(),
                        self.dim
                    ),
                ));
            }
        }

        self.with_conn(move |conn| {
            for point in &points {
                conn.execute(
                    "INSERT OR REPLACE INTO points \
                     (id, route_id, route_name, utterance, is_negative, \
                      score_threshold, negative_threshold, vector) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        point.id.to_string(),
                        point.payload.route_id,
                        point.payload.route_name,
                        point.payload.utterance,
                        point.payload.is_negative as i64,
                        point.payload.score_threshold as f64,
                        point.payload.negative_threshold as f64,
                        vector_to_bytes(&point.vector),
                    ],
                )
                .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?;
            }
            Ok(())
        })
        .await
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> AppResult<()> {
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.with_conn(move |conn| {
            for id in &ids {
                conn.execute("DELETE FROM points WHERE id = ?1", params![id])
                    .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?;
            }
            Ok(())
        })
        .await
    }

    async fn delete_by_route(&self, route_id: i64) -> AppResult<()> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM points WHERE route_id = ?1", params![route_id])
                .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &PointFilter,
    ) -> AppResult<Vec<SearchHit>> {
        let points = self.load_points(filter).await?;

        let mut hits: Vec<SearchHit> = points
            .into_iter()
            .map(|point| SearchHit {
                id: point.id,
                score: cosine_similarity(vector, &point.vector),
                payload: point.payload,
            })
            .collect();

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
        self.load_points(filter).await
    }

    async fn all_ids_with_payload(&self) -> AppResult<HashMap<Uuid, PointPayload>> {
        let points = self.load_points(&PointFilter::any()).await?;
        Ok(points
            .into_iter()
            .map(|point| (point.id, point.payload))
            .collect())
    }

    async fn ids_by_route(&self, route_id: i64) -> AppResult<HashSet<Uuid>> {
        let filter = PointFilter {
            route_id: Some(route_id),
            negatives: None,
        };
        let points = self.load_points(&filter).await?;
        Ok(points.into_iter().map(|point| point.id).collect())
    }

    async fn count(&self) -> AppResult<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM points", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(|e| AppError::backend("sqlite-index", e.to_string()))
        })
        .await
    }

    async fn reset(&self) -> AppResult<()> {
        let dim = self.dim;
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM points", [])
                .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('dim', ?1)",
                params![dim.to_string()],
            )
            .map_err(|e| AppError::backend("sqlite-index", e.to_string()))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::positive_point_id;
    use tempfile::TempDir;

    fn point(route_id: i64, utterance: &str, vector: Vec<f32>) -> Point {
        Point {
            id: positive_point_id(route_id, utterance),
            vector,
            payload: PointPayload {
                route_id,
                route_name: format!("route-{}", route_id),
                utterance: utterance.to_string(),
                is_negative: false,
                score_threshold: 0.75,
                negative_threshold: 0.95,
            },
        }
    }

    #[tokio::test]
    async fn test_vector_blob_roundtrip() {
        let original = vec![0.25f32, -1.5, 3.0];
        let bytes = vector_to_bytes(&original);
        assert_eq!(bytes_to_vector(&bytes).unwrap(), original);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("points.db");

        {
            let index = SqliteIndex::open(&path, 3).await.unwrap();
            index
                .upsert(vec![point(1, "hello", vec![1.0, 0.0, 0.0])])
                .await
                .unwrap();
        }

        let index = SqliteIndex::open(&path, 3).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        let hits = index
            .search(&[1.0, 0.0, 0.0], 1, &PointFilter::positives())
            .await
            .unwrap();
        assert_eq!(hits[0].payload.utterance, "hello");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_dimension_change_clears_points() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("points.db");

        {
            let index = SqliteIndex::open(&path, 3).await.unwrap();
            index
                .upsert(vec![point(1, "hello", vec![1.0, 0.0, 0.0])])
                .await
                .unwrap();
        }

        let index = SqliteIndex::open(&path, 4).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_route() {
        let temp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&temp.path().join("points.db"), 3)
            .await
            .unwrap();

        index
            .upsert(vec![
                point(1, "a", vec![1.0, 0.0, 0.0]),
                point(2, "b", vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        index.delete_by_route(1).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index.ids_by_route(1).await.unwrap().is_empty());
    }
}
