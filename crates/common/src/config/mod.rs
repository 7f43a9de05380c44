//! Configuration management for RecallForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Every field has a default so an empty configuration is valid; `validate`
//! is what turns bad values into a fatal configuration error.

use crate::context::ContextWindowStrategy;
use crate::errors::{AppError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval pipeline configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Remote backend endpoints and credentials
    #[serde(default)]
    pub backends: BackendsConfig,

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

    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

/// Kind of recall stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Local BM25 index plus vector similarity
    Local,
    /// Remote managed search index
    ManagedIndex,
    /// Remote document-understanding service
    DocumentAi,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Local, StreamKind::ManagedIndex, StreamKind::DocumentAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Local => "local",
            StreamKind::ManagedIndex => "managed_index",
            StreamKind::DocumentAi => "document_ai",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stream knobs
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct StreamSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Weight applied to this stream's scores when merging (0.0 - 1.0)
    #[serde(default = "default_stream_weight")]
    pub weight: f32,

    /// Result-count cap for this stream
    #[serde(default = "default_stream_top_k")]
    pub top_k: usize,

    /// Per-stream timeout in milliseconds
    #[serde(default = "default_stream_timeout_ms")]
    pub timeout_ms: u64,
}

impl StreamSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the settings of the stream called `name`
    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.weight.is_finite() || !(0.0..=1.0).contains(&self.weight) {
            return Err(AppError::configuration(format!(
                "stream '{}' weight {} is outside [0, 1]",
                name, self.weight
            )));
        }
        if self.top_k == 0 {
            return Err(AppError::configuration(format!("stream '{}' top_k must be positive", name)));
        }
        if self.timeout_ms == 0 {
            return Err(AppError::configuration(format!("stream '{}' timeout_ms must be positive", name)));
        }
        Ok(())
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            weight: default_stream_weight(),
            top_k: default_stream_top_k(),
            timeout_ms: default_stream_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamsConfig {
    #[serde(default = "default_local_stream")]
    pub local: StreamSettings,

    #[serde(default = "default_remote_stream")]
    pub managed_index: StreamSettings,

    #[serde(default = "default_remote_stream")]
    pub document_ai: StreamSettings,
}

impl StreamsConfig {
    pub fn get(&self, kind: StreamKind) -> &StreamSettings {
        match kind {
            StreamKind::Local => &self.local,
            StreamKind::ManagedIndex => &self.managed_index,
            StreamKind::DocumentAi => &self.document_ai,
        }
    }
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            local: default_local_stream(),
            managed_index: default_remote_stream(),
            document_ai: default_remote_stream(),
        }
    }
}

/// BM25 tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bm25Config {
    /// Term-frequency saturation
    #[serde(default = "default_bm25_k1")]
    pub k1: f32,

    /// Length normalization strength (0.0 - 1.0)
    #[serde(default = "default_bm25_b")]
    pub b: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: default_bm25_k1(), b: default_bm25_b() }
    }
}

impl Bm25Config {
    /// k1 must be finite and non-negative, b within [0, 1]
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(AppError::configuration(format!("bm25.k1 {} must be >= 0", self.k1)));
        }
        check_unit("bm25.b", self.b)
    }
}

/// Injection screener thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// A single finding above this severity makes the query unsafe
    #[serde(default = "default_unsafe_threshold")]
    pub unsafe_threshold: f32,

    /// A finding at or above this severity short-circuits screening
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f32,

    /// Summed severity above this makes the query unsafe
    #[serde(default = "default_aggregate_threshold")]
    pub aggregate_threshold: f32,

    /// Replacement for matched spans in the sanitized query
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            unsafe_threshold: default_unsafe_threshold(),
            critical_threshold: default_critical_threshold(),
            aggregate_threshold: default_aggregate_threshold(),
            placeholder: default_placeholder(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Per-stream settings
    #[serde(default)]
    pub streams: StreamsConfig,

    /// Fuse BM25 with vector similarity in the local stream
    #[serde(default = "default_enabled")]
    pub use_hybrid_search: bool,

    /// Weight of the vector signal in hybrid fusion (alpha)
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// Maximum total characters of selected document content
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,

    /// Ordering/selection policy for the final documents
    #[serde(default)]
    pub context_window_strategy: ContextWindowStrategy,

    #[serde(default = "default_enabled")]
    pub enable_injection_detection: bool,

    #[serde(default = "default_enabled")]
    pub enable_entity_recognition: bool,

    /// Return an empty result instead of continuing with the sanitized query
    #[serde(default)]
    pub reject_unsafe_queries: bool,

    /// Final result count when a caller does not specify one
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default)]
    pub bm25: Bm25Config,

    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            streams: StreamsConfig::default(),
            use_hybrid_search: default_enabled(),
            vector_weight: default_vector_weight(),
            max_context_length: default_max_context_length(),
            context_window_strategy: ContextWindowStrategy::default(),
            enable_injection_detection: default_enabled(),
            enable_entity_recognition: default_enabled(),
            reject_unsafe_queries: false,
            default_top_k: default_top_k(),
            bm25: Bm25Config::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Reject configurations the orchestrator cannot run with.
    ///
    /// Stream-level checks only look at enabled streams.
    pub fn validate(&self) -> Result<()> {
        let enabled: Vec<StreamKind> = StreamKind::ALL
            .into_iter()
            .filter(|k| self.streams.get(*k).enabled)
            .collect();
        if enabled.is_empty() {
            return Err(AppError::configuration("no recall streams enabled"));
        }
        for kind in enabled {
            self.streams.get(kind).validate(kind.as_str())?;
        }

        check_unit("vector_weight", self.vector_weight)?;
        if self.max_context_length == 0 {
            return Err(AppError::configuration("max_context_length must be positive"));
        }
        if self.default_top_k == 0 {
            return Err(AppError::configuration("default_top_k must be positive"));
        }
        self.bm25.validate()?;
        check_unit("security.unsafe_threshold", self.security.unsafe_threshold)?;
        check_unit("security.critical_threshold", self.security.critical_threshold)?;
        if !self.security.aggregate_threshold.is_finite() || self.security.aggregate_threshold < 0.0 {
            return Err(AppError::configuration("security.aggregate_threshold must be >= 0"));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(AppError::configuration(format!("{} {} is outside [0, 1]", name, value)));
    }
    Ok(())
}

/// Remote backend A: managed search index
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManagedIndexConfig {
    /// Base URL of the search service
    pub endpoint: Option<String>,

    /// Sent in the `api-key` header
    pub api_key: Option<String>,

    /// Index to query
    #[serde(default = "default_index_name")]
    pub index_name: String,
}

/// Remote backend B: document-understanding service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentAiConfig {
    /// Base URL of the service
    pub endpoint: Option<String>,

    /// Bearer token
    pub api_key: Option<String>,

    /// Corpus/collection to query
    #[serde(default = "default_corpus")]
    pub corpus: String,
}

impl Default for ManagedIndexConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            index_name: default_index_name(),
        }
    }
}

impl Default for DocumentAiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            corpus: default_corpus(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub managed_index: ManagedIndexConfig,

    #[serde(default)]
    pub document_ai: DocumentAiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level / filter directive (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_enabled")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
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

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_body_bytes() -> usize { 2 * 1024 * 1024 }
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_enabled() -> bool { true }
fn default_stream_weight() -> f32 { 1.0 }
fn default_stream_top_k() -> usize { 20 }
fn default_stream_timeout_ms() -> u64 { 2_000 }
fn default_local_stream() -> StreamSettings { StreamSettings::default() }
fn default_remote_stream() -> StreamSettings {
    StreamSettings { enabled: false, weight: 0.8, top_k: 10, timeout_ms: 3_000 }
}
fn default_bm25_k1() -> f32 { 1.2 }
fn default_bm25_b() -> f32 { 0.75 }
fn default_unsafe_threshold() -> f32 { 0.8 }
fn default_critical_threshold() -> f32 { 0.9 }
fn default_aggregate_threshold() -> f32 { 1.5 }
fn default_placeholder() -> String { "[filtered]".to_string() }
fn default_vector_weight() -> f32 { 0.6 }
fn default_max_context_length() -> usize { 8_000 }
fn default_top_k() -> usize { 10 }
fn default_index_name() -> String { "knowledge".to_string() }
fn default_corpus() -> String { "default".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "recallforge".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__STREAMS__LOCAL__WEIGHT=0.5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate every section that has constraints
    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;
        if self.embedding.dimension == 0 {
            return Err(AppError::configuration("embedding.dimension must be positive"));
        }
        for kind in [StreamKind::ManagedIndex, StreamKind::DocumentAi] {
            if self.retrieval.streams.get(kind).enabled && self.backend_endpoint(kind).is_none() {
                return Err(AppError::configuration(format!(
                    "stream '{}' is enabled but has no endpoint",
                    kind
                )));
            }
        }
        Ok(())
    }

    /// Endpoint configured for a remote stream kind
    pub fn backend_endpoint(&self, kind: StreamKind) -> Option<&str> {
        match kind {
            StreamKind::Local => None,
            StreamKind::ManagedIndex => self.backends.managed_index.endpoint.as_deref(),
            StreamKind::DocumentAi => self.backends.document_ai.endpoint.as_deref(),
        }
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
