//! Authoritative route store.
//!
//! Routes live in memory behind a read/write lock and are persisted to a
//! JSON-array journal. All mutations pass through a single serializing
//! gate: a write returns only after both the in-memory map and the journal
//! file reflect it, and the journal is replaced atomically (write-to-temp,
//! rename). Reads are lock-held only long enough to clone a snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use intent_core::{AppError, AppResult};

use crate::types::Route;

pub struct RouteStore {
    journal_path: PathBuf,
    routes: RwLock<HashMap<i64, Route>>,
    write_gate: Mutex<()>,
    /// Monotonic counter bumped by every accepted write; diagnostics
    /// caches key off it.
    version: AtomicU64,
}

impl RouteStore {
    /// Open a store backed by the journal at `path`. A missing file means
    /// an empty store; a malformed one is a hard error.
    pub fn open(path: &Path) -> AppResult<Self> {
        let routes = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let list: Vec<Route> = serde_json::from_str(&contents).map_err(|e| {
                AppError::Config(format!("Failed to parse route journal {:?}: {}", path, e))
            })?;

            let mut map = HashMap::with_capacity(list.len());
            for route in list {
                if route.id == 0 {
                    return Err(AppError::Config(
                        "Route journal contains reserved id 0".to_string(),
                    ));
                }
                if map.insert(route.id, route).is_some() {
                    return Err(AppError::Config(format!(
                        "Route journal {:?} contains duplicate ids",
                        path
                    )));
                }
            }
            tracing::info!("Loaded {} route(s) from {:?}", map.len(), path);
            map
        } else {
            tracing::info!("Route journal {:?} not found, starting empty", path);
            HashMap::new()
        };

        Ok(Self {
            journal_path: path.to_path_buf(),
            routes: RwLock::new(routes),
            write_gate: Mutex::new(()),
            version: AtomicU64::new(0),
        })
    }

    /// Current store version. Bumped on every accepted write.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// All routes, ordered by id.
    pub fn list(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self.read_map().values().cloned().collect();
        routes.sort_by_key(|route| route.id);
        routes
    }

    pub fn get(&self, id: i64) -> Option<Route> {
        self.read_map().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    /// Case-insensitive substring search over name, description and
    /// utterances. An empty query returns everything.
    pub fn search(&self, query: &str) -> Vec<Route> {
        if query.is_empty() {
            return self.list();
        }

        let needle = query.to_lowercase();
        let mut matches: Vec<Route> = self
            .read_map()
            .values()
            .filter(|route| {
                route.name.to_lowercase().contains(&needle)
                    || route.description.to_lowercase().contains(&needle)
                    || route
                        .utterances
                        .iter()
                        .any(|u| u.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        matches.sort_by_key(|route| route.id);
        matches
    }

    /// Create a route, or replace an existing one when a non-zero id is
    /// given. `id == 0` requests auto-assignment (max existing + 1).
    pub fn create(&self, mut route: Route) -> AppResult<Route> {
        let gate = self.gate()?;
        let mut next = self.read_map().clone();

        if route.id < 0 {
            return Err(AppError::Validation(format!(
                "Route id must be non-negative, got {}",
                route.id
            )));
        }

        if route.id == 0 {
            route.id = next.keys().max().copied().unwrap_or(0) + 1;
            tracing::info!("Auto-assigned route id {}", route.id);
        } else if !next.contains_key(&route.id) {
            return Err(AppError::NotFound(format!(
                "Route {} does not exist; send id 0 to create a new route",
                route.id
            )));
        }

        route.validate()?;
        next.insert(route.id, route.clone());
        self.commit(gate, next)?;

        tracing::info!("Route saved: {} (id {})", route.name, route.id);
        Ok(route)
    }

    /// Replace the route at `id` atomically.
    pub fn update(&self, id: i64, mut route: Route) -> AppResult<Route> {
        let gate = self.gate()?;
        let mut next = self.read_map().clone();

        if !next.contains_key(&id) {
            return Err(AppError::NotFound(format!("Route {} does not exist", id)));
        }

        route.id = id;
        route.validate()?;
        next.insert(id, route.clone());
        self.commit(gate, next)?;

        tracing::info!("Route updated: {} (id {})", route.name, id);
        Ok(route)
    }

    /// Delete the route at `id`. Surviving ids are left untouched so point
    /// identity in the vector index stays valid.
    pub fn delete(&self, id: i64) -> AppResult<Route> {
        let gate = self.gate()?;
        let mut next = self.read_map().clone();

        let removed = next
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Route {} does not exist", id)))?;
        self.commit(gate, next)?;

        tracing::info!("Route deleted: {} (id {})", removed.name, id);
        Ok(removed)
    }

    /// Replace only the utterances of a route, leaving negative samples
    /// and thresholds alone. Used when a repair suggestion is applied.
    pub fn replace_utterances(&self, id: i64, utterances: Vec<String>) -> AppResult<Route> {
        let gate = self.gate()?;
        let mut next = self.read_map().clone();

        let mut route = next
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Route {} does not exist", id)))?;
        route.utterances = utterances;
        route.validate()?;

        next.insert(id, route.clone());
        self.commit(gate, next)?;

        tracing::info!(
            "Route utterances replaced: {} (id {}, {} utterances)",
            route.name,
            id,
            route.utterances.len()
        );
        Ok(route)
    }

    /// Replace the negative sample list of a route, optionally adjusting
    /// the veto threshold.
    pub fn replace_negative_samples(
        &self,
        id: i64,
        negative_samples: Vec<String>,
        negative_threshold: Option<f32>,
    ) -> AppResult<Route> {
        let gate = self.gate()?;
        let mut next = self.read_map().clone();

        let mut route = next
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Route {} does not exist", id)))?;
        route.negative_samples = negative_samples;
        if let Some(threshold) = negative_threshold {
            route.negative_threshold = threshold;
        }
        route.validate()?;

        next.insert(id, route.clone());
        self.commit(gate, next)?;

        tracing::info!(
            "Route negative samples replaced: {} (id {}, {} samples)",
            route.name,
            id,
            route.negative_samples.len()
        );
        Ok(route)
    }

    fn gate(&self) -> AppResult<MutexGuard<'_, ()>> {
        self.write_gate
            .lock()
            .map_err(|_| AppError::Conflict("writer gate poisoned by a failed write".to_string()))
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i64, Route>> {
        // A poisoned map lock means a reader panicked mid-clone; the data
        // itself is never mutated under the read lock.
        match self.routes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Persist `next` to the journal, then swap it in and bump the
    /// version. Journal failure leaves memory untouched.
    fn commit(&self, _gate: MutexGuard<'_, ()>, next: HashMap<i64, Route>) -> AppResult<()> {
        self.persist(&next)?;

        match self.routes.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        self.version.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn persist(&self, routes: &HashMap<i64, Route>) -> AppResult<()> {
        if let Some(parent) = self.journal_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut list: Vec<&Route> = routes.values().collect();
        list.sort_by_key(|route| route.id);

        let json = serde_json::to_string_pretty(&list)?;
        let tmp = self.journal_path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.journal_path)?;
        Ok(())
    }
}
