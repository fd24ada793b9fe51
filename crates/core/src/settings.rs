//! Runtime settings for Intent Hub.
//!
//! Settings are a flat set of recognized keys persisted as a JSON object.
//! Resolution precedence is: environment variable > settings file >
//! built-in default. Writes go through [`Settings::update`], which rejects
//! unrecognized keys and type mismatches, and are persisted atomically.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{AppError, AppResult};

/// All recognized runtime settings.
///
/// Serialized field names are the canonical setting keys; the same names
/// are honored as environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Vector database endpoint. Empty selects the embedded local index.
    #[serde(rename = "QDRANT_URL", default)]
    pub qdrant_url: String,

    #[serde(rename = "QDRANT_API_KEY", default)]
    pub qdrant_api_key: Option<String>,

    #[serde(rename = "QDRANT_COLLECTION", default = "default_collection")]
    pub qdrant_collection: String,

    #[serde(rename = "EMBEDDING_MODEL_NAME", default = "default_embedding_model")]
    pub embedding_model_name: String,

    /// Device hint for local embedding execution (cpu/cuda/mps).
    #[serde(rename = "EMBEDDING_DEVICE", default = "default_embedding_device")]
    pub embedding_device: String,

    /// Dimension used by the offline lexical embedder. Remote embedders
    /// report their own dimension and ignore this.
    #[serde(rename = "EMBEDDING_DIM", default = "default_embedding_dim")]
    pub embedding_dim: usize,

    #[serde(rename = "HUGGINGFACE_ACCESS_TOKEN", default)]
    pub huggingface_access_token: Option<String>,

    #[serde(rename = "HUGGINGFACE_PROVIDER", default)]
    pub huggingface_provider: Option<String>,

    #[serde(rename = "LLM_PROVIDER", default = "default_llm_provider")]
    pub llm_provider: String,

    #[serde(rename = "LLM_API_KEY", default)]
    pub llm_api_key: Option<String>,

    #[serde(rename = "LLM_BASE_URL", default)]
    pub llm_base_url: Option<String>,

    #[serde(rename = "LLM_MODEL", default)]
    pub llm_model: Option<String>,

    #[serde(rename = "LLM_TEMPERATURE", default = "default_llm_temperature")]
    pub llm_temperature: f32,

    /// Override for the utterance-generation prompt template. `None` uses
    /// the built-in template.
    #[serde(rename = "UTTERANCE_GENERATION_PROMPT", default)]
    pub utterance_generation_prompt: Option<String>,

    /// Override for the overlap-repair prompt template.
    #[serde(rename = "AGENT_REPAIR_PROMPT", default)]
    pub agent_repair_prompt: Option<String>,

    #[serde(
        rename = "REGION_THRESHOLD_SIGNIFICANT",
        default = "default_region_threshold"
    )]
    pub region_threshold_significant: f32,

    #[serde(
        rename = "INSTANCE_THRESHOLD_AMBIGUOUS",
        default = "default_instance_threshold"
    )]
    pub instance_threshold_ambiguous: f32,

    /// Embedding batch size used by the synchronizer.
    #[serde(rename = "BATCH_SIZE", default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(rename = "DEFAULT_ROUTE_ID", default)]
    pub default_route_id: i64,

    #[serde(rename = "DEFAULT_ROUTE_NAME", default = "default_route_name")]
    pub default_route_name: String,

    /// Master switch for management-endpoint authentication.
    #[serde(rename = "AUTH_ENABLED", default = "default_true")]
    pub auth_enabled: bool,

    /// Comma-separated static API keys accepted without expiry.
    #[serde(rename = "API_KEYS", default)]
    pub api_keys: Option<String>,

    /// Separate secret gating only the predict endpoint. `None` means the
    /// endpoint accepts unauthenticated calls.
    #[serde(rename = "PREDICT_AUTH_KEY", default)]
    pub predict_auth_key: Option<String>,

    #[serde(rename = "DEFAULT_USERNAME", default = "default_username")]
    pub default_username: String,

    #[serde(rename = "DEFAULT_PASSWORD", default = "default_password")]
    pub default_password: String,

    /// Path of the route journal file.
    #[serde(rename = "ROUTES_JOURNAL_PATH", default = "default_journal_path")]
    pub routes_journal_path: String,

    /// Path of the embedded vector store. The literal value `memory`
    /// selects the in-process index.
    #[serde(rename = "VECTOR_STORE_PATH", default = "default_vector_store_path")]
    pub vector_store_path: String,
}

fn default_collection() -> String {
    "intent_hub_routes".to_string()
}

fn default_embedding_model() -> String {
    "Qwen/Qwen3-Embedding-0.6B".to_string()
}

fn default_embedding_device() -> String {
    "cpu".to_string()
}

fn default_embedding_dim() -> usize {
    384
}

fn default_llm_provider() -> String {
    "deepseek".to_string()
}

fn default_llm_temperature() -> f32 {
    0.7
}

fn default_region_threshold() -> f32 {
    0.85
}

fn default_instance_threshold() -> f32 {
    0.92
}

fn default_batch_size() -> usize {
    32
}

fn default_route_name() -> String {
    "none".to_string()
}

fn default_true() -> bool {
    true
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "123456".to_string()
}

fn default_journal_path() -> String {
    "data/routes.json".to_string()
}

fn default_vector_store_path() -> String {
    "data/points.db".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        // An empty JSON object yields every serde default.
        serde_json::from_value(Value::Object(Map::new()))
            .expect("settings defaults must deserialize")
    }
}

impl Settings {
    /// Load settings from a JSON file, then apply environment overrides.
    ///
    /// A missing file means defaults. A malformed file is a hard error:
    /// silently discarding operator configuration would be worse than
    /// failing to start.
    pub fn load(path: &Path) -> AppResult<Self> {
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!("Failed to read settings file {:?}: {}", path, e))
            })?;
            serde_json::from_str(&contents).map_err(|e| {
                AppError::Config(format!("Failed to parse settings file {:?}: {}", path, e))
            })?
        } else {
            tracing::info!("Settings file {:?} not found, using defaults", path);
            Self::default()
        };

        settings.apply_env()?;
        Ok(settings)
    }

    /// Apply a patch of `key -> value` pairs.
    ///
    /// Unknown keys and type mismatches are rejected as validation errors
    /// and leave the settings unchanged. Returns the keys whose value
    /// actually changed.
    pub fn update(&mut self, patch: &Map<String, Value>) -> AppResult<Vec<String>> {
        let mut map = self.as_map()?;
        let mut changed = Vec::new();

        for (key, value) in patch {
            match map.get(key) {
                None => {
                    return Err(AppError::Validation(format!(
                        "Unrecognized setting: {}",
                        key
                    )))
                }
                Some(current) if current == value => {}
                Some(_) => {
                    map.insert(key.clone(), value.clone());
                    changed.push(key.clone());
                }
            }
        }

        let next: Settings = serde_json::from_value(Value::Object(map))
            .map_err(|e| AppError::Validation(format!("Invalid settings payload: {}", e)))?;
        *self = next;
        Ok(changed)
    }

    /// Overlay environment variables named after the setting keys.
    pub fn apply_env(&mut self) -> AppResult<()> {
        let current = self.as_map()?;
        let mut patch = Map::new();

        for (key, value) in &current {
            if let Ok(raw) = std::env::var(key) {
                patch.insert(key.clone(), coerce_env_value(value, &raw));
            }
        }

        if !patch.is_empty() {
            tracing::debug!("Applying {} environment override(s)", patch.len());
            self.update(&patch)?;
        }
        Ok(())
    }

    /// Persist to `path` atomically (write-to-temp, rename).
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Config(format!("Failed to create settings directory: {}", e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        tracing::info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Export a `KEY=value` mirror so a restart outside the settings file
    /// (e.g. a container env file) sees the last-saved state. Multi-line
    /// values such as prompt templates are skipped.
    pub fn export_env_mirror(&self, path: &Path) -> AppResult<()> {
        let map = self.as_map()?;
        let mut lines = Vec::new();

        for (key, value) in &map {
            let rendered = match value {
                Value::Null => continue,
                Value::String(s) if s.contains('\n') => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("{}={}", key, rendered));
        }

        std::fs::write(path, lines.join("\n") + "\n")?;
        Ok(())
    }

    /// The full settings object as exposed on the management API.
    pub fn public_view(&self) -> AppResult<Value> {
        Ok(Value::Object(self.as_map()?))
    }

    fn as_map(&self) -> AppResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(AppError::Serialization(
                "settings did not serialize to an object".to_string(),
            )),
        }
    }
}

/// Convert a raw environment string to the JSON type of the field it
/// overrides. Unparseable numerics fall back to strings, which then fail
/// `update` with a proper validation error.
fn coerce_env_value(current: &Value, raw: &str) -> Value {
    match current {
        Value::Bool(_) => Value::Bool(matches!(
            raw.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )),
        Value::Number(_) => {
            if let Ok(int) = raw.parse::<i64>() {
                Value::Number(int.into())
            } else if let Some(num) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64)
            {
                Value::Number(num)
            } else {
                Value::String(raw.to_string())
            }
        }
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.qdrant_collection, "intent_hub_routes");
        assert_eq!(settings.batch_size, 32);
        assert_eq!(settings.default_route_id, 0);
        assert_eq!(settings.default_route_name, "none");
        assert!((settings.region_threshold_significant - 0.85).abs() < 1e-6);
        assert!((settings.instance_threshold_ambiguous - 0.92).abs() < 1e-6);
        assert!(settings.auth_enabled);
    }

    #[test]
    fn test_update_known_key() {
        let mut settings = Settings::default();
        let mut patch = Map::new();
        patch.insert("BATCH_SIZE".to_string(), Value::Number(64.into()));
        patch.insert(
            "QDRANT_URL".to_string(),
            Value::String("http://localhost:6333".to_string()),
        );

        let changed = settings.update(&patch).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(settings.batch_size, 64);
        assert_eq!(settings.qdrant_url, "http://localhost:6333");
    }

    #[test]
    fn test_update_rejects_unknown_key() {
        let mut settings = Settings::default();
        let mut patch = Map::new();
        patch.insert("NOT_A_SETTING".to_string(), Value::Bool(true));

        let err = settings.update(&patch).unwrap_err();
        assert!(err.to_string().contains("Unrecognized setting"));
    }

    #[test]
    fn test_update_rejects_type_mismatch() {
        let mut settings = Settings::default();
        let mut patch = Map::new();
        patch.insert(
            "BATCH_SIZE".to_string(),
            Value::String("not a number".to_string()),
        );

        assert!(settings.update(&patch).is_err());
        // Unchanged on failure
        assert_eq!(settings.batch_size, 32);
    }

    #[test]
    fn test_unchanged_value_not_reported() {
        let mut settings = Settings::default();
        let mut patch = Map::new();
        patch.insert("BATCH_SIZE".to_string(), Value::Number(32.into()));

        let changed = settings.update(&patch).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");

        let mut settings = Settings::default();
        settings.qdrant_url = "http://qdrant:6333".to_string();
        settings.llm_api_key = Some("sk-test".to_string());
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.qdrant_url, "http://qdrant:6333");
        assert_eq!(loaded.llm_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let temp = TempDir::new().unwrap();
        let loaded = Settings::load(&temp.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_env_coercion() {
        assert_eq!(
            coerce_env_value(&Value::Bool(true), "false"),
            Value::Bool(false)
        );
        assert_eq!(
            coerce_env_value(&Value::Number(1.into()), "64"),
            Value::Number(64.into())
        );
        assert_eq!(
            coerce_env_value(&Value::String(String::new()), "hello"),
            Value::String("hello".to_string())
        );
    }

    #[test]
    fn test_env_mirror_skips_multiline(){
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime.env");

        let mut settings = Settings::default();
        settings.utterance_generation_prompt = Some("line one\nline two".to_string());
        settings.export_env_mirror(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("BATCH_SIZE=32"));
        assert!(!contents.contains("line one"));
    }
}
