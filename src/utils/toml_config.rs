//! TOML-based configuration for Scribe
//!
//! This module provides declarative configuration for the language provider,
//! embeddings, knowledge retrieval and the writing stage via a TOML file
//! (`scribe.toml`). Every field has a default, so an empty file is valid.
//!
//! # Hot Reloading
//!
//! Configuration changes are detected and applied at runtime. Use
//! `ScribeConfigManager` for thread-safe access to the current configuration.
//! A run takes one snapshot when it starts, so a reload only affects runs
//! started afterwards.

use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from scribe.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScribeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Language model provider
    #[serde(default)]
    pub llm: ProviderConfig,

    /// Per-stage model overrides for the configured provider
    #[serde(default)]
    pub models: ModelOverrides,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub writing: WritingConfig,
}

// ============= Server Configuration =============

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

// ============= Provider Configuration =============

/// `[llm]` section, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_model")]
        default_model: String,
    },
    OpenAI {
        /// Environment variable containing API key
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        default_model: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "qwen3:8b".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Ollama {
            base_url: default_ollama_url(),
            default_model: default_ollama_model(),
        }
    }
}

impl ProviderConfig {
    /// The model used when a stage has no override
    pub fn default_model(&self) -> &str {
        match self {
            ProviderConfig::Ollama { default_model, .. }
            | ProviderConfig::OpenAI { default_model, .. } => default_model,
        }
    }
}

/// Optional model names per stage. `None` falls back to the provider default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelOverrides {
    pub reading: Option<String>,
    pub analysis: Option<String>,
    pub writing: Option<String>,
}

// ============= Embedding Configuration =============

/// Embedding backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX models run in-process through fastembed
    FastEmbed,
    /// Embeddings served by an Ollama instance
    Ollama,
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Ollama server, for the `ollama` provider
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Where fastembed keeps downloaded model files
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::FastEmbed
}

fn default_embedding_model() -> String {
    "bge-small-en-v1.5".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            base_url: default_ollama_url(),
            cache_dir: None,
        }
    }
}

// ============= Search Configuration =============

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    8
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

// ============= Knowledge Configuration =============

/// `[knowledge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Results per query text from the run's own extracted sources
    #[serde(default = "default_ephemeral_top_k")]
    pub ephemeral_top_k: usize,

    #[serde(default = "default_ephemeral_similarity_threshold")]
    pub ephemeral_similarity_threshold: f32,

    /// Results per query text from the long-lived corpus store
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub similarity_threshold: f32,

    /// Markdown or text files ingested into the corpus store at startup
    #[serde(default)]
    pub corpus_paths: Vec<PathBuf>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_ephemeral_top_k() -> usize {
    5
}

fn default_ephemeral_similarity_threshold() -> f32 {
    0.3
}

fn default_top_k() -> usize {
    10
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            ephemeral_top_k: default_ephemeral_top_k(),
            ephemeral_similarity_threshold: default_ephemeral_similarity_threshold(),
            top_k: default_top_k(),
            similarity_threshold: 0.0,
            corpus_paths: Vec::new(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

// ============= Writing Configuration =============

/// `[writing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritingConfig {
    /// Turn budget for one conversation cell
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Token the reviewer emits to approve a draft
    #[serde(default = "default_approval_token")]
    pub approval_token: String,

    /// Extra attempts for a failed section
    #[serde(default)]
    pub section_retries: u32,

    /// Per-section deadline; unset means no deadline
    #[serde(default)]
    pub section_deadline_secs: Option<u64>,
}

fn default_max_turns() -> usize {
    12
}

fn default_approval_token() -> String {
    "APPROVE".to_string()
}

impl Default for WritingConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            approval_token: default_approval_token(),
            section_retries: 0,
            section_deadline_secs: None,
        }
    }
}

impl WritingConfig {
    /// Deadline per section attempt, if any
    pub fn section_deadline(&self) -> Option<Duration> {
        self.section_deadline_secs.map(Duration::from_secs)
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(err: ConfigError) -> Self {
        crate::types::AppError::Configuration(err.to_string())
    }
}

impl ScribeConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ScribeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate ranges and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let ProviderConfig::OpenAI { api_key_env, .. } = &self.llm {
            self.validate_env_var(api_key_env)?;
        }

        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }
        if self.embedding.provider == EmbeddingProvider::FastEmbed {
            let model = &self.embedding.model;
            match crate::knowledge::embeddings::fastembed_dimension(model) {
                None => {
                    return Err(ConfigError::ValidationError(format!(
                        "embedding.model '{}' is not a supported fastembed model",
                        model
                    )));
                }
                Some(dimension) if dimension != self.embedding.dimension => {
                    return Err(ConfigError::ValidationError(format!(
                        "embedding.dimension is {} but '{}' produces {}",
                        self.embedding.dimension, model, dimension
                    )));
                }
                Some(_) => {}
            }
        }

        if self.search.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "search.max_results must be at least 1".to_string(),
            ));
        }

        let k = &self.knowledge;
        for (name, value) in [
            ("knowledge.ephemeral_similarity_threshold", k.ephemeral_similarity_threshold),
            ("knowledge.similarity_threshold", k.similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if k.ephemeral_top_k == 0 || k.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge top_k values must be at least 1".to_string(),
            ));
        }
        if k.chunk_overlap >= k.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "knowledge.chunk_overlap ({}) must be smaller than chunk_size ({})",
                k.chunk_overlap, k.chunk_size
            )));
        }

        // writer, reviewer and at least one revision
        if self.writing.max_turns < 3 {
            return Err(ConfigError::ValidationError(format!(
                "writing.max_turns must be at least 3, got {}",
                self.writing.max_turns
            )));
        }
        if self.writing.approval_token.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "writing.approval_token must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Model for the reading stage, falling back to the default
    pub fn reading_model(&self) -> &str {
        self.models
            .reading
            .as_deref()
            .unwrap_or_else(|| self.llm.default_model())
    }

    pub fn analysis_model(&self) -> &str {
        self.models
            .analysis
            .as_deref()
            .unwrap_or_else(|| self.llm.default_model())
    }

    pub fn writing_model(&self) -> &str {
        self.models
            .writing
            .as_deref()
            .unwrap_or_else(|| self.llm.default_model())
    }
}

// ============= Hot Reloading Configuration Manager =============

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);
const WRITE_SETTLE: Duration = Duration::from_millis(100);

/// Holds the current configuration and swaps in new versions of the file.
///
/// Readers take an `Arc<ScribeConfig>` snapshot with [`config`](Self::config);
/// a run keeps its snapshot until it finishes, so a reload only affects runs
/// started afterwards.
pub struct ScribeConfigManager {
    current: Arc<ArcSwap<ScribeConfig>>,
    path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl ScribeConfigManager {
    /// Load the file at `path` (resolved against the working directory)
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = std::path::absolute(path.as_ref()).map_err(ConfigError::ReadError)?;
        let config = ScribeConfig::load(&path)?;

        Ok(Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            path,
            watcher: RwLock::new(None),
        })
    }

    /// Wrap an in-memory config; there is no file to reload or watch
    pub fn from_config(config: ScribeConfig) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            path: PathBuf::new(),
            watcher: RwLock::new(None),
        }
    }

    /// Lock-free snapshot of the current configuration
    pub fn config(&self) -> Arc<ScribeConfig> {
        self.current.load_full()
    }

    /// Absolute path of the watched file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file now. On error the previous configuration stays active.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = ScribeConfig::load(&self.path)?;
        self.current.store(Arc::new(config));
        info!(path = %self.path.display(), "configuration reloaded");
        Ok(())
    }

    /// Reload whenever the config file is written.
    ///
    /// The parent directory is watched so that editors which replace the file
    /// instead of writing in place are still picked up; events for other files
    /// in that directory are ignored.
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let target = self.path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event.paths.iter().any(|p| p == &target);
                    if relevant {
                        let _ = tx.send(());
                    }
                }
                Err(e) => error!(error = %e, "config watcher error"),
            }
        })?;

        let dir = self
            .path
            .parent()
            .ok_or_else(|| ConfigError::ValidationError("config path has no parent directory".to_string()))?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        *self.watcher.write() = Some(watcher);

        let path = self.path.clone();
        let current = Arc::clone(&self.current);
        tokio::spawn(async move {
            let mut last_reload: Option<std::time::Instant> = None;

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|t| t.elapsed() < RELOAD_DEBOUNCE) {
                    continue;
                }
                tokio::time::sleep(WRITE_SETTLE).await;

                match ScribeConfig::load(&path) {
                    Ok(config) => {
                        current.store(Arc::new(config));
                        last_reload = Some(std::time::Instant::now());
                        info!(path = %path.display(), "configuration hot-reloaded");
                    }
                    Err(e) => warn!(error = %e, "hot reload failed, keeping previous configuration"),
                }
            }
        });

        info!(path = %self.path.display(), "watching configuration file");
        Ok(())
    }
}
