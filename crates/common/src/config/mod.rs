//! Configuration management for Inocua services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Completion (chat model) configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Domain gate thresholds
    #[serde(default)]
    pub gate: GateConfig,

    /// Corpus locations
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (mock provider only; remote models report their own)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_retries")]
    pub max_retries: u32,

    /// First backoff interval in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// Completion provider: openai, mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for the chat model
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_retries")]
    pub max_retries: u32,

    /// First backoff interval in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Distinct sources to keep after diversification
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Upper bound on expansion queries (original included)
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,

    /// Ask the chat model to rerank candidates before answering
    #[serde(default)]
    pub rerank_enabled: bool,

    /// Maximum candidates kept by the reranker
    #[serde(default = "default_rerank_max")]
    pub rerank_max: usize,

    /// Characters of each candidate shown to the reranker
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    /// Below this score a query without domain hints is rejected
    #[serde(default = "default_weak_threshold")]
    pub weak_threshold: f32,

    /// At or above this score a broad query is answered without clarification
    #[serde(default = "default_strong_threshold")]
    pub strong_threshold: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorpusConfig {
    /// Path to the precomputed embedding artifact
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,

    /// Directory holding deliverable documents
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,

    /// URL prefix under which documents are served
    #[serde(default = "default_docs_base_url")]
    pub docs_base_url: String,

    /// Load the corpus at startup instead of on the first request
    #[serde(default = "default_enabled")]
    pub eager_load: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level / filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_enabled")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 1536 }
fn default_completion_model() -> String { "gpt-4o-mini".to_string() }
fn default_temperature() -> f32 { 0.15 }
fn default_max_tokens() -> u32 { 700 }
fn default_external_timeout() -> u64 { 30 }
fn default_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 200 }
fn default_top_k() -> usize { 6 }
fn default_max_expansions() -> usize { 6 }
fn default_rerank_max() -> usize { 8 }
fn default_preview_chars() -> usize { 400 }
fn default_weak_threshold() -> f32 { 0.65 }
fn default_strong_threshold() -> f32 { 0.80 }
fn default_artifact_path() -> String { "data/embeddings.json".to_string() }
fn default_docs_dir() -> String { "docs".to_string() }
fn default_docs_base_url() -> String { "/docs".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "inocua".to_string() }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__GATE__WEAK_THRESHOLD=0.6
            .add_source(Self::env_source())
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Self::env_source())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn env_source() -> Environment {
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let gate = &self.gate;
        for (name, value) in [("weak_threshold", gate.weak_threshold), ("strong_threshold", gate.strong_threshold)] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(AppError::Configuration {
                    message: format!("gate.{} must lie in [-1, 1], got {}", name, value),
                });
            }
        }
        if gate.weak_threshold > gate.strong_threshold {
            return Err(AppError::Configuration {
                message: format!(
                    "gate.weak_threshold ({}) exceeds gate.strong_threshold ({})",
                    gate.weak_threshold, gate.strong_threshold
                ),
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::Configuration {
                message: "retrieval.top_k must be at least 1".to_string(),
            });
        }
        if self.retrieval.max_expansions == 0 {
            return Err(AppError::Configuration {
                message: "retrieval.max_expansions must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_external_timeout(),
            max_retries: default_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_external_timeout(),
            max_retries: default_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_expansions: default_max_expansions(),
            rerank_enabled: false,
            rerank_max: default_rerank_max(),
            preview_chars: default_preview_chars(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            weak_threshold: default_weak_threshold(),
            strong_threshold: default_strong_threshold(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
            docs_dir: default_docs_dir(),
            docs_base_url: default_docs_base_url(),
            eager_load: default_enabled(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_enabled(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            retrieval: RetrievalConfig::default(),
            gate: GateConfig::default(),
            corpus: CorpusConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
