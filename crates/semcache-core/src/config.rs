//! semcache Configuration Management
//!
//! Handles configuration from environment variables and TOML config files,
//! with defaults matching a local development setup (Qdrant on localhost,
//! OpenAI `text-embedding-3-small`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const REDACTED: &str = "***";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Vector store connection
    pub store: StoreConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Lookup behaviour
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        // Qdrant
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.store.qdrant_url = url;
        }
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            self.store.qdrant_api_key = Some(key);
        }
        if let Ok(collection) = std::env::var("QDRANT_COLLECTION") {
            self.store.collection = collection;
        }
        if let Ok(dimension) = std::env::var("VECTOR_DIMENSION") {
            self.store.vector_dimension = parse_var("VECTOR_DIMENSION", dimension)?;
        }

        // Embeddings
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.embedding.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.embedding.openai_base_url = Some(url);
        }
        if let Ok(endpoint) = std::env::var("AZURE_OPENAI_ENDPOINT") {
            self.embedding.azure_endpoint = Some(endpoint);
        }
        if let Ok(key) = std::env::var("AZURE_OPENAI_KEY") {
            self.embedding.azure_api_key = Some(key);
        }
        if let Ok(deployment) = std::env::var("AZURE_OPENAI_DEPLOYMENT") {
            self.embedding.azure_deployment = deployment;
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.embedding.ollama_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        // Lookup
        if let Ok(threshold) = std::env::var("SIMILARITY_THRESHOLD") {
            self.cache.similarity_threshold = parse_var("SIMILARITY_THRESHOLD", threshold)?;
        }
        if let Ok(timeout) = std::env::var("REQUEST_TIMEOUT_SECS") {
            self.cache.request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", timeout)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(self)
    }

    /// Check cross-field constraints and provider credentials
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.vector_dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "store.vector_dimension".to_string(),
                value: "0".to_string(),
            });
        }
        if !self.cache.similarity_threshold.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "cache.similarity_threshold".to_string(),
                value: self.cache.similarity_threshold.to_string(),
            });
        }

        match self.embedding.provider {
            EmbeddingProvider::OpenAI if self.embedding.openai_api_key.is_none() => Err(
                ConfigError::MissingRequired("OPENAI_API_KEY".to_string()),
            ),
            EmbeddingProvider::Azure if self.embedding.azure_endpoint.is_none() => Err(
                ConfigError::MissingRequired("AZURE_OPENAI_ENDPOINT".to_string()),
            ),
            EmbeddingProvider::Azure if self.embedding.azure_api_key.is_none() => Err(
                ConfigError::MissingRequired("AZURE_OPENAI_KEY".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Copy with every credential replaced, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        let hide = |v: &mut Option<String>| {
            if v.is_some() {
                *v = Some(REDACTED.to_string());
            }
        };
        hide(&mut config.store.qdrant_api_key);
        hide(&mut config.embedding.openai_api_key);
        hide(&mut config.embedding.azure_api_key);
        config
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Vector store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Qdrant API key (Qdrant Cloud)
    pub qdrant_api_key: Option<String>,

    /// Collection holding cached prompt/completion pairs
    pub collection: String,

    /// Vector dimension (must match embedding model)
    pub vector_dimension: usize,

    /// Scalar-quantize the vector index when creating the collection
    pub quantized: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            collection: "chat_cache".to_string(),
            vector_dimension: 1536, // OpenAI text-embedding-3-small
            quantized: true,
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider to use
    pub provider: EmbeddingProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for compatible APIs)
    pub openai_base_url: Option<String>,

    /// Azure OpenAI resource endpoint
    pub azure_endpoint: Option<String>,

    /// Azure OpenAI key
    pub azure_api_key: Option<String>,

    /// Azure OpenAI embedding deployment name
    pub azure_deployment: String,

    /// Azure OpenAI REST API version
    pub azure_api_version: String,

    /// Ollama server URL
    pub ollama_url: String,

    /// Embedding model name
    pub model: String,

    /// HTTP request timeout in seconds (0 disables it)
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            azure_endpoint: None,
            azure_api_key: None,
            azure_deployment: "embeddings".to_string(),
            azure_api_version: "2024-02-01".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            model: "text-embedding-3-small".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAI,
    Azure,
    Ollama,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "azure" => Ok(Self::Azure),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Similarity a stored entry must strictly exceed to count as a hit
    pub similarity_threshold: f32,

    /// Deadline for each embedding call and store query, in seconds
    pub request_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.95,
            request_timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
