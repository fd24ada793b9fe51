//! Application state and component lifecycle.
//!
//! All engine components hang off one `AppState`. Settings writes rebind
//! the affected components: embedding-related keys rebuild the embedder
//! (and force a full reindex if the vector dimension changed), vector-
//! database keys rebuild the index client, and everything else takes
//! effect by rebuilding the cheap wrapper components in place.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use intent_core::{AppResult, Settings};
use intent_llm::{create_client, Advisor, LlmOptions};
use intent_routing::diagnostics::DiagnosticsEngine;
use intent_routing::embeddings::{create_embedder, Embedder};
use intent_routing::index::{create_index, VectorIndex};
use intent_routing::predict::Predictor;
use intent_routing::store::RouteStore;
use intent_routing::sync::{SyncMode, SyncReport, Synchronizer};
use intent_routing::CancelToken;

use crate::auth::AuthManager;

/// Settings keys that require a new embedder when changed.
const EMBEDDER_KEYS: &[&str] = &[
    "EMBEDDING_MODEL_NAME",
    "EMBEDDING_DEVICE",
    "EMBEDDING_DIM",
    "HUGGINGFACE_ACCESS_TOKEN",
    "HUGGINGFACE_PROVIDER",
];

/// Settings keys that require a new vector index client when changed.
const INDEX_KEYS: &[&str] = &[
    "QDRANT_URL",
    "QDRANT_API_KEY",
    "QDRANT_COLLECTION",
    "VECTOR_STORE_PATH",
];

/// The engine components bound to one settings snapshot.
pub struct Components {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub synchronizer: Arc<Synchronizer>,
    pub predictor: Arc<Predictor>,
    pub diagnostics: Arc<DiagnosticsEngine>,
}

pub struct AppState {
    settings: RwLock<Settings>,
    settings_path: PathBuf,
    pub store: Arc<RouteStore>,
    components: RwLock<Arc<Components>>,
    pub auth: AuthManager,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build the full application state and run the startup sync.
    pub async fn init(settings: Settings, settings_path: PathBuf) -> AppResult<SharedState> {
        let store = Arc::new(RouteStore::open(Path::new(&settings.routes_journal_path))?);
        let components = build_components(&settings, None).await?;
        let auth = AuthManager::from_settings(&settings);

        let state = Arc::new(AppState {
            settings: RwLock::new(settings),
            settings_path,
            store,
            components: RwLock::new(components),
            auth,
        });

        // Bring the index in line with the journal before serving.
        if let Err(e) = state.run_sync(SyncMode::Incremental).await {
            tracing::warn!("Startup sync failed (will self-heal on next write): {}", e);
        }

        Ok(state)
    }

    /// Clone of the current settings.
    pub fn settings_snapshot(&self) -> Settings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Current component set.
    pub fn components(&self) -> Arc<Components> {
        match self.components.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Run a synchronizer pass with the current components.
    pub async fn run_sync(&self, mode: SyncMode) -> AppResult<SyncReport> {
        let components = self.components();
        components
            .synchronizer
            .sync(&self.store, mode, &CancelToken::new())
            .await
    }

    /// Incremental sync after a route write. Failures are logged, not
    /// surfaced: the store write already succeeded and the next sync
    /// converges.
    pub async fn sync_after_write(&self) {
        if let Err(e) = self.run_sync(SyncMode::Incremental).await {
            tracing::warn!("Post-write sync failed (will retry on next write): {}", e);
        }
    }

    /// Apply a settings patch, persist it, and rebind components.
    ///
    /// Returns the keys that changed. An embedder dimension change resets
    /// the index and forces a full reindex.
    pub async fn apply_settings(&self, patch: &Map<String, Value>) -> AppResult<Vec<String>> {
        let mut next = self.settings_snapshot();
        let changed = next.update(patch)?;
        if changed.is_empty() {
            return Ok(changed);
        }

        next.save(&self.settings_path)?;
        let mirror = self.settings_path.with_file_name("runtime.env");
        if let Err(e) = next.export_env_mirror(&mirror) {
            tracing::warn!("Failed to write env mirror {:?}: {}", mirror, e);
        }

        let rebuild_embedder = changed.iter().any(|k| EMBEDDER_KEYS.contains(&k.as_str()));
        let rebuild_index = changed.iter().any(|k| INDEX_KEYS.contains(&k.as_str()));

        let previous = self.components();
        let embedder = if rebuild_embedder {
            create_embedder(&next).await?
        } else {
            Arc::clone(&previous.embedder)
        };
        let dimension_changed = embedder.dim() != previous.embedder.dim();

        // The running index instance is kept unless its connection keys
        // changed or its dimension no longer matches the embedder.
        let index = if rebuild_index || dimension_changed {
            create_index(&next, embedder.dim()).await?
        } else {
            Arc::clone(&previous.index)
        };

        let components = assemble_components(embedder, index, &next);
        self.install(next, Arc::clone(&components));
        tracing::info!("Settings updated ({} key(s)), components rebound", changed.len());

        if dimension_changed {
            tracing::warn!(
                "Embedding dimension changed ({} -> {}), forcing full reindex",
                previous.embedder.dim(),
                components.embedder.dim()
            );
            components.index.reset().await?;
            if let Err(e) = self.run_sync(SyncMode::ForcedFull).await {
                tracing::warn!("Full reindex after rebind failed: {}", e);
            }
        } else if rebuild_embedder || rebuild_index {
            if let Err(e) = self.run_sync(SyncMode::Incremental).await {
                tracing::warn!("Sync after rebind failed: {}", e);
            }
        }

        Ok(changed)
    }

    /// Build a per-request advisor from the current settings.
    pub fn advisor(&self) -> AppResult<Advisor> {
        let settings = self.settings_snapshot();
        let client = create_client(&LlmOptions {
            provider: settings.llm_provider.clone(),
            api_key: settings.llm_api_key.clone(),
            base_url: settings.llm_base_url.clone(),
            model: settings.llm_model.clone(),
            temperature: settings.llm_temperature,
        })?;

        Ok(Advisor::new(
            client,
            settings.utterance_generation_prompt.clone(),
            settings.agent_repair_prompt.clone(),
        ))
    }

    fn install(&self, settings: Settings, components: Arc<Components>) {
        match self.settings.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
        match self.components.write() {
            Ok(mut guard) => *guard = components,
            Err(poisoned) => *poisoned.into_inner() = components,
        }
    }
}

/// Build a fresh component set for a settings snapshot.
pub async fn build_components(
    settings: &Settings,
    reuse_embedder: Option<Arc<dyn Embedder>>,
) -> AppResult<Arc<Components>> {
    let embedder = match reuse_embedder {
        Some(embedder) => embedder,
        None => create_embedder(settings).await?,
    };
    let index = create_index(settings, embedder.dim()).await?;
    Ok(assemble_components(embedder, index, settings))
}

/// Wire the cheap wrapper components around an embedder and index.
fn assemble_components(
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    settings: &Settings,
) -> Arc<Components> {
    let synchronizer = Arc::new(Synchronizer::new(
        Arc::clone(&embedder),
        Arc::clone(&index),
        settings.batch_size,
    ));

    let predictor = Arc::new(
        Predictor::new(Arc::clone(&embedder), Arc::clone(&index))
            .with_fallback(settings.default_route_id, settings.default_route_name.clone()),
    );

    let diagnostics = Arc::new(DiagnosticsEngine::new(
        Arc::clone(&index),
        settings.region_threshold_significant,
        settings.instance_threshold_ambiguous,
    ));

    Arc::new(Components {
        embedder,
        index,
        synchronizer,
        predictor,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_settings(temp: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.routes_journal_path = temp
            .path()
            .join("routes.json")
            .to_string_lossy()
            .to_string();
        settings.vector_store_path = "memory".to_string();
        settings
    }

    #[tokio::test]
    async fn test_init_builds_components() {
        let temp = TempDir::new().unwrap();
        let settings = test_settings(&temp);
        let state = AppState::init(settings, temp.path().join("settings.json"))
            .await
            .unwrap();

        let components = state.components();
        assert_eq!(components.embedder.provider_name(), "lexical");
        assert_eq!(components.index.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_apply_settings_rejects_unknown_key() {
        let temp = TempDir::new().unwrap();
        let state = AppState::init(test_settings(&temp), temp.path().join("settings.json"))
            .await
            .unwrap();

        let mut patch = Map::new();
        patch.insert("NO_SUCH_KEY".to_string(), Value::Bool(true));
        assert!(state.apply_settings(&patch).await.is_err());
    }

    #[tokio::test]
    async fn test_apply_settings_persists_and_rebinds() {
        let temp = TempDir::new().unwrap();
        let settings_path = temp.path().join("settings.json");
        let state = AppState::init(test_settings(&temp), settings_path.clone())
            .await
            .unwrap();

        let mut patch = Map::new();
        patch.insert(
            "REGION_THRESHOLD_SIGNIFICANT".to_string(),
            serde_json::json!(0.9),
        );
        let changed = state.apply_settings(&patch).await.unwrap();
        assert_eq!(changed, vec!["REGION_THRESHOLD_SIGNIFICANT".to_string()]);

        assert!(settings_path.exists());
        let reloaded = Settings::load(&settings_path).unwrap();
        assert!((reloaded.region_threshold_significant - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embedding_dim_change_forces_reindex() {
        let temp = TempDir::new().unwrap();
        let state = AppState::init(test_settings(&temp), temp.path().join("settings.json"))
            .await
            .unwrap();

        // Seed a route so the reindex has something to rebuild.
        state
            .store
            .create(intent_routing::Route {
                id: 0,
                name: "weather".to_string(),
                description: String::new(),
                utterances: vec!["forecast".to_string()],
                negative_samples: Vec::new(),
                score_threshold: 0.75,
                negative_threshold: 0.95,
            })
            .unwrap();
        state.sync_after_write().await;

        let mut patch = Map::new();
        patch.insert("EMBEDDING_DIM".to_string(), serde_json::json!(128));
        state.apply_settings(&patch).await.unwrap();

        let components = state.components();
        assert_eq!(components.embedder.dim(), 128);
        assert_eq!(components.index.dim(), 128);
        assert_eq!(components.index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_advisor_requires_api_key() {
        let temp = TempDir::new().unwrap();
        let state = AppState::init(test_settings(&temp), temp.path().join("settings.json"))
            .await
            .unwrap();
        // Default settings carry no LLM key.
        assert!(state.advisor().is_err());
    }
}
