//! Configuration loading, validation, and management for Weft.
//!
//! Loads configuration from `~/.weft/config.toml` with environment variable
//! overrides. Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.weft/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model used to size the context window when a build names none
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used for summarization; falls back to `default_model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,

    /// Tenant every vector query is scoped to
    #[serde(default = "default_organization_id")]
    pub organization_id: String,

    /// Token budget and compression settings
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Memory retrieval settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Snapshot cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Completion/embedding provider settings
    #[serde(default)]
    pub provider: ProviderConfig,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_organization_id() -> String {
    "default".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Tokens kept free for the model's answer
    #[serde(default = "default_reserved_for_response")]
    pub reserved_for_response: usize,

    /// Turns kept verbatim when older ones are summarized
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Fraction of the usable budget at which compression is considered
    #[serde(default = "default_summary_trigger_ratio")]
    pub summary_trigger_ratio: f32,

    #[serde(default = "default_summarization_timeout_ms")]
    pub summarization_timeout_ms: u64,

    /// Extra or overriding context-window sizes, keyed by model name
    #[serde(default)]
    pub model_limits: HashMap<String, usize>,
}

fn default_reserved_for_response() -> usize {
    1000
}
fn default_keep_recent() -> usize {
    5
}
fn default_summary_trigger_ratio() -> f32 {
    0.7
}
fn default_summarization_timeout_ms() -> u64 {
    5_000
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            reserved_for_response: default_reserved_for_response(),
            keep_recent: default_keep_recent(),
            summary_trigger_ratio: default_summary_trigger_ratio(),
            summarization_timeout_ms: default_summarization_timeout_ms(),
            model_limits: HashMap::new(),
        }
    }
}

impl BudgetConfig {
    pub fn summarization_timeout(&self) -> Duration {
        Duration::from_millis(self.summarization_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum memories kept after fusion
    #[serde(default = "default_memory_limit")]
    pub limit: usize,

    #[serde(default = "default_thread_top_k")]
    pub thread_top_k: usize,

    #[serde(default = "default_user_top_k")]
    pub user_top_k: usize,

    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,

    /// Memories scoring below this are discarded before ranking
    #[serde(default)]
    pub min_relevance: f32,

    /// Upper bound for each retrieval call (history read, vector query)
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,
}

fn default_memory_limit() -> usize {
    5
}
fn default_thread_top_k() -> usize {
    3
}
fn default_user_top_k() -> usize {
    3
}
fn default_semantic_top_k() -> usize {
    2
}
fn default_retrieval_timeout_ms() -> u64 {
    2_000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            limit: default_memory_limit(),
            thread_top_k: default_thread_top_k(),
            user_top_k: default_user_top_k(),
            semantic_top_k: default_semantic_top_k(),
            min_relevance: 0.0,
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

impl MemoryConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Snapshot freshness window
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Optional LRU cap on cached snapshots; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

fn default_ttl_secs() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            embedding_model: default_embedding_model(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl EngineConfig {
    /// Load configuration from the default path (~/.weft/config.toml).
    ///
    /// Also checks environment variables:
    /// - `WEFT_API_KEY`, then `OPENAI_API_KEY` (only if no key in the file)
    /// - `WEFT_MODEL`
    /// - `WEFT_ORGANIZATION_ID`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("WEFT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("WEFT_MODEL") {
            config.default_model = model;
        }

        if let Ok(org) = std::env::var("WEFT_ORGANIZATION_ID") {
            config.organization_id = org;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".weft")
    }

    /// The model used for summarization calls.
    pub fn summary_model(&self) -> &str {
        self.summary_model.as_deref().unwrap_or(&self.default_model)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.organization_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "organization_id must not be empty".into(),
            ));
        }

        let ratio = self.budget.summary_trigger_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::ValidationError(
                "budget.summary_trigger_ratio must be in (0.0, 1.0]".into(),
            ));
        }

        if self.budget.keep_recent < 2 {
            return Err(ConfigError::ValidationError(
                "budget.keep_recent must be at least 2".into(),
            ));
        }

        if let Some((model, limit)) = self
            .budget
            .model_limits
            .iter()
            .find(|(_, limit)| **limit <= self.budget.reserved_for_response)
        {
            return Err(ConfigError::ValidationError(format!(
                "model_limits.{model} ({limit}) must exceed reserved_for_response ({})",
                self.budget.reserved_for_response
            )));
        }

        if !(0.0..=1.0).contains(&self.memory.min_relevance) {
            return Err(ConfigError::ValidationError(
                "memory.min_relevance must be between 0.0 and 1.0".into(),
            ));
        }

        if self.cache.max_entries == Some(0) {
            return Err(ConfigError::ValidationError(
                "cache.max_entries must be greater than 0 when set".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            summary_model: None,
            organization_id: default_organization_id(),
            budget: BudgetConfig::default(),
            memory: MemoryConfig::default(),
            cache: CacheConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
