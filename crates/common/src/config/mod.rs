//! Configuration management for Counsel services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Every section is optional; missing keys fall back to the defaults below.

use crate::context::BudgetUnit;
use crate::errors::{AppError, Result};
use crate::index::SimilarityMetric;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    pub index: IndexConfig,

    /// Retrieval and context assembly
    pub retrieval: RetrievalConfig,

    /// Model backends and fallback order
    pub models: ModelsConfig,

    /// Query validation and answer scoring
    pub query: QueryConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,

    /// Maximum queries accepted in one batch request
    pub max_batch_queries: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use; doubles as the version tag stored with every vector
    pub model: String,

    /// Embedding dimension
    pub dimension: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retries
    pub max_retries: u32,

    /// Batch size for embedding requests
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Similarity metric used for nearest-neighbour search
    pub metric: SimilarityMetric,

    /// Upper bound on fragment text length (characters)
    pub max_fragment_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest neighbours fetched per query
    pub top_k: usize,

    /// Fragments scoring below this are never placed in the prompt
    pub similarity_floor: f32,

    /// Context budget, measured in `budget_unit`
    pub context_budget: usize,

    /// Unit of the context budget
    pub budget_unit: BudgetUnit,

    /// Optional cap on the number of fragments in a prompt
    pub max_fragments: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Configured model backends
    pub candidates: Vec<ModelCandidateConfig>,

    /// Default preference order (candidate names); empty means declaration order
    pub preference: Vec<String>,

    /// Same-model retries granted after a timeout
    pub timeout_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelCandidateConfig {
    /// Name used in preference orders and reported as `model_used`
    pub name: String,

    /// Provider: openai, anthropic, mock
    pub provider: String,

    /// Provider model identifier
    #[serde(default)]
    pub model: String,

    /// Endpoint override
    pub endpoint: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_model_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum output tokens
    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_model_temperature")]
    pub temperature: f32,
}

impl ModelCandidateConfig {
    /// Per-attempt timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum accepted query length in characters
    pub max_query_chars: usize,

    /// Confidence of a successful answer with no supporting context
    pub confidence_base: f32,

    /// Maximum accepted text for summaries, analyses and drafting, in characters
    pub max_document_chars: usize,

    /// Overall model-routing deadline; derived from the candidate timeouts when unset
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    pub metrics_port: u16,

    /// Service name for logs
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    pub requests_per_second: u32,

    /// Burst capacity
    pub burst: u32,

    /// Enable rate limiting
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_batch_queries() -> usize { 10 }
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 32 }
fn default_max_fragment_chars() -> usize { 4000 }
fn default_top_k() -> usize { 8 }
fn default_similarity_floor() -> f32 { 0.35 }
fn default_context_budget() -> usize { 6000 }
fn default_max_fragments() -> Option<usize> { Some(5) }
fn default_model_timeout_ms() -> u64 { 20_000 }
fn default_model_max_tokens() -> u32 { 1024 }
fn default_model_temperature() -> f32 { 0.2 }
fn default_timeout_retries() -> u32 { 1 }
fn default_max_query_chars() -> usize { 2000 }
fn default_confidence_base() -> f32 { 0.2 }
fn default_max_document_chars() -> usize { 50_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "counsel".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_batch_queries: default_max_batch_queries(),
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
            batch_size: default_batch_size(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::Cosine,
            max_fragment_chars: default_max_fragment_chars(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_floor: default_similarity_floor(),
            context_budget: default_context_budget(),
            budget_unit: BudgetUnit::Characters,
            max_fragments: default_max_fragments(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            candidates: vec![ModelCandidateConfig::default()],
            preference: Vec::new(),
            timeout_retries: default_timeout_retries(),
        }
    }
}

impl Default for ModelCandidateConfig {
    fn default() -> Self {
        Self {
            name: "counsel-mock".to_string(),
            provider: "mock".to_string(),
            model: String::new(),
            endpoint: None,
            api_key: None,
            timeout_ms: default_model_timeout_ms(),
            max_tokens: default_model_max_tokens(),
            temperature: default_model_temperature(),
        }
    }
}

impl ModelsConfig {
    /// Effective default preference order
    pub fn preference_order(&self) -> Vec<String> {
        if self.preference.is_empty() {
            self.candidates.iter().map(|c| c.name.clone()).collect()
        } else {
            self.preference.clone()
        }
    }

    /// Look up a candidate by name
    pub fn candidate(&self, name: &str) -> Option<&ModelCandidateConfig> {
        self.candidates.iter().find(|c| c.name == name)
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_max_query_chars(),
            confidence_base: default_confidence_base(),
            max_document_chars: default_max_document_chars(),
            deadline_ms: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

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
            // e.g., APP__SERVER__PORT=8081
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

    /// Reject configurations the pipeline cannot serve requests with.
    ///
    /// Called once at startup so misconfiguration never surfaces per request.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(AppError::configuration("embedding.dimension must be greater than zero"));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(AppError::configuration("embedding.model must not be empty"));
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::configuration("retrieval.top_k must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_floor) {
            return Err(AppError::configuration(format!(
                "retrieval.similarity_floor must be within [0, 1], got {}",
                self.retrieval.similarity_floor
            )));
        }
        if self.query.max_query_chars == 0 {
            return Err(AppError::configuration("query.max_query_chars must be greater than zero"));
        }
        if !(0.0..1.0).contains(&self.query.confidence_base) {
            return Err(AppError::configuration("query.confidence_base must be within [0, 1)"));
        }
        if self.query.max_document_chars == 0 {
            return Err(AppError::configuration("query.max_document_chars must be greater than zero"));
        }
        if self.query.deadline_ms == Some(0) {
            return Err(AppError::configuration("query.deadline_ms must be greater than zero when set"));
        }

        if self.models.candidates.is_empty() {
            return Err(AppError::configuration("no candidate models configured"));
        }

        let mut seen = HashSet::new();
        for candidate in &self.models.candidates {
            if candidate.name.trim().is_empty() {
                return Err(AppError::configuration("model candidate with empty name"));
            }
            if !seen.insert(candidate.name.as_str()) {
                return Err(AppError::configuration(format!(
                    "duplicate model candidate '{}'",
                    candidate.name
                )));
            }
            if candidate.timeout_ms == 0 {
                return Err(AppError::configuration(format!(
                    "model candidate '{}' has a zero timeout",
                    candidate.name
                )));
            }
        }

        for name in &self.models.preference {
            if !seen.contains(name.as_str()) {
                return Err(AppError::configuration(format!(
                    "preference order references unknown model '{}'",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            models: ModelsConfig::default(),
            query: QueryConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "counsel-hashing-v1");
        assert_eq!(config.query.max_query_chars, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_candidates_is_configuration_error() {
        let mut config = AppConfig::default();
        config.models.candidates.clear();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_preference_rejected() {
        let mut config = AppConfig::default();
        config.models.preference = vec!["claude".to_string()];

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("claude"));
    }

    #[test]
    fn test_floor_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.similarity_floor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let mut config = AppConfig::default();
        config.query.deadline_ms = Some(0);
        assert!(matches!(config.validate(), Err(AppError::Configuration { .. })));

        config.query.deadline_ms = Some(5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preference_order_falls_back_to_declaration_order() {
        let config = AppConfig::default();
        assert_eq!(config.models.preference_order(), vec!["counsel-mock".to_string()]);
    }

    #[test]
    fn test_partial_sections_deserialize_with_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "retrieval": { "top_k": 3 }, "index": { "metric": "euclidean" } }"#,
        )
        .unwrap();

        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.context_budget, 6000);
        assert_eq!(config.index.metric, SimilarityMetric::Euclidean);
        assert_eq!(config.models.candidates.len(), 1);
    }
}
