use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::adjust::StallPolicy;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MilesConfig {
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub coaching: CoachingConfig,
}

impl MilesConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: MilesConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.llm.chat_model = v;
        }
        if let Ok(v) = std::env::var("LLM_UTILITY_MODEL") {
            self.llm.utility_model = v;
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                self.llm.max_tokens = n;
            }
        }
        if let Ok(v) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                self.llm.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("MILES_STORE_BACKEND") {
            if let Some(backend) = StoreBackend::parse_str(&v) {
                self.store.backend = backend;
            } else {
                tracing::warn!("Ignoring unknown MILES_STORE_BACKEND={}", v);
            }
        }
        if let Ok(v) = std::env::var("MILES_DB_PATH") {
            self.store.db_path = v;
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai" or "mock".
    pub provider: String,
    /// Model for coaching replies.
    pub chat_model: String,
    /// Cheaper model for insight extraction, suggestions and tips.
    pub utility_model: String,
    pub base_url: Option<String>,
    /// Cap for chat replies; the utility calls use their own smaller caps.
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            chat_model: "gpt-4-turbo".to_string(),
            utility_model: "gpt-3.5-turbo".to_string(),
            base_url: None,
            max_tokens: 500,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Relational rows in SQLite.
    #[default]
    Sqlite,
    /// JSON documents held in process memory.
    Document,
}

impl StoreBackend {
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Some(StoreBackend::Sqlite),
            "document" => Some(StoreBackend::Document),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            db_path: "miles.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoachingConfig {
    /// Messages forwarded to the model per reply.
    pub history_window: usize,
    pub stall_progress_threshold: u8,
    pub stall_days: i64,
    /// Conversations shorter than this are not analysed for motivations.
    pub insight_min_messages: usize,
    pub min_motivation_len: usize,
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            history_window: crate::window::DEFAULT_HISTORY_WINDOW,
            stall_progress_threshold: 30,
            stall_days: 7,
            insight_min_messages: 4,
            min_motivation_len: 3,
        }
    }
}

impl CoachingConfig {
    pub fn stall_policy(&self) -> StallPolicy {
        StallPolicy {
            progress_threshold: self.stall_progress_threshold,
            max_idle: chrono::Duration::days(self.stall_days),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = MilesConfig::default();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.max_tokens, 500);
        assert_eq!(cfg.store.backend, StoreBackend::Sqlite);
        assert_eq!(cfg.coaching.history_window, 20);
        assert_eq!(cfg.coaching.stall_policy(), StallPolicy::default());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[llm]
provider = "mock"
"#;
        let cfg: MilesConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        // Defaults for unspecified fields
        assert_eq!(cfg.llm.chat_model, "gpt-4-turbo");
        assert_eq!(cfg.store.db_path, "miles.db");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[llm]
provider = "openai"
chat_model = "gpt-4o"
utility_model = "gpt-4o-mini"
base_url = "http://localhost:8080/v1"
max_tokens = 300
temperature = 0.5
timeout_secs = 10

[store]
backend = "document"
db_path = "data/miles.db"

[coaching]
history_window = 12
stall_progress_threshold = 50
stall_days = 3
insight_min_messages = 6
min_motivation_len = 5
"#;
        let cfg: MilesConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.utility_model, "gpt-4o-mini");
        assert_eq!(cfg.llm.base_url.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(cfg.llm.timeout_secs, 10);
        assert_eq!(cfg.store.backend, StoreBackend::Document);
        assert_eq!(cfg.coaching.history_window, 12);
        let policy = cfg.coaching.stall_policy();
        assert_eq!(policy.progress_threshold, 50);
        assert_eq!(policy.max_idle, chrono::Duration::days(3));
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        std::env::set_var("LLM_PROVIDER", "mock");
        std::env::set_var("MILES_STORE_BACKEND", "document");

        let mut cfg = MilesConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.store.backend, StoreBackend::Document);

        std::env::remove_var("LLM_PROVIDER");
        std::env::remove_var("MILES_STORE_BACKEND");

        let cfg = MilesConfig::load_or_default("/nonexistent/path.toml");
        assert_eq!(cfg.llm.provider, "openai");
    }
}
