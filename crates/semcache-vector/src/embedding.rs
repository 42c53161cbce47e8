//! Embedding client for generating vector representations
//!
//! Supports OpenAI, Azure OpenAI and Ollama embedding APIs.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use reqwest::Client;
use semcache_core::{EmbeddingConfig, EmbeddingProvider, Result, SemCacheError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;
}

/// Build the HTTP client; a timeout of 0 disables the client-side timeout
fn http_client(timeout_secs: u64) -> Result<Client> {
    let mut builder = Client::builder();
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder
        .build()
        .map_err(|e| SemCacheError::ConfigError(format!("Failed to build HTTP client: {e}")))
}

/// Known output sizes of OpenAI embedding models
fn openai_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        _ => 1536, // Default
    }
}

// ============================================================================
// OpenAI wire format (shared with Azure OpenAI)
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

async fn read_openai_response(
    response: reqwest::Response,
    provider: &str,
    expected: usize,
) -> Result<Vec<Vec<f32>>> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(SemCacheError::EmbeddingError(format!(
            "{provider} embedding error ({status}): {error_text}"
        )));
    }

    let result: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
        SemCacheError::EmbeddingError(format!("Failed to parse embedding response: {e}"))
    })?;

    if result.data.len() != expected {
        return Err(SemCacheError::EmbeddingError(format!(
            "{provider} returned {} embeddings for {expected} inputs",
            result.data.len()
        )));
    }

    // Sort by index and extract embeddings
    let mut embeddings = result.data;
    embeddings.sort_by_key(|e| e.index);

    Ok(embeddings.into_iter().map(|e| e.embedding).collect())
}

fn first_embedding(results: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    results
        .into_iter()
        .next()
        .ok_or_else(|| SemCacheError::EmbeddingError("No embedding returned".to_string()))
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            dimension: openai_dimension(&model),
            model,
        }
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| SemCacheError::ConfigError("OpenAI API key required".to_string()))?;

        let mut client = Self::new(api_key.clone(), config.model.clone());
        client.client = http_client(config.timeout_secs)?;
        if let Some(url) = &config.openai_base_url {
            client = client.with_base_url(url.clone());
        }
        Ok(client)
    }

    /// Set custom base URL (for compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the embedding dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        first_embedding(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAiEmbeddingRequest {
            input: texts,
            model: Some(&self.model),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SemCacheError::EmbeddingError(format!("Embedding request failed: {e}")))?;

        read_openai_response(response, "OpenAI", texts.len()).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Azure OpenAI Embedding Client
// ============================================================================

/// Azure OpenAI embedding client
///
/// The deployment selects the model, so no model name is sent.
pub struct AzureOpenAiEmbedding {
    client: Client,
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    dimension: usize,
}

impl AzureOpenAiEmbedding {
    /// Create a new Azure OpenAI embedding client
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: "2024-02-01".to_string(),
            dimension: 1536,
        }
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config.azure_endpoint.as_ref().ok_or_else(|| {
            SemCacheError::ConfigError("Azure OpenAI endpoint required".to_string())
        })?;
        let api_key = config
            .azure_api_key
            .as_ref()
            .ok_or_else(|| SemCacheError::ConfigError("Azure OpenAI key required".to_string()))?;

        let mut client = Self::new(endpoint.clone(), api_key.clone(), &config.azure_deployment)
            .with_api_version(&config.azure_api_version)
            .with_dimension(openai_dimension(&config.model));
        client.client = http_client(config.timeout_secs)?;
        Ok(client)
    }

    /// Set REST API version
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Override the embedding dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[async_trait]
impl EmbeddingClient for AzureOpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        first_embedding(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAiEmbeddingRequest {
            input: texts,
            model: None,
        };

        let response = self
            .client
            .post(format!(
                "{}/openai/deployments/{}/embeddings",
                self.endpoint, self.deployment
            ))
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                SemCacheError::EmbeddingError(format!("Azure embedding request failed: {e}"))
            })?;

        read_openai_response(response, "Azure OpenAI", texts.len()).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768, // Default for most models
        };

        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let mut client = Self::new(config.ollama_url.clone(), config.model.clone());
        client.client = http_client(config.timeout_secs)?;
        Ok(client)
    }

    /// Override the embedding dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                SemCacheError::EmbeddingError(format!("Ollama embedding request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SemCacheError::EmbeddingError(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            SemCacheError::EmbeddingError(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(result.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Ollama doesn't have native batch embedding, so we process sequentially
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
///
/// `dimension` is the vector size of the cache collection; it overrides
/// whatever the client would infer from the model name.
pub fn create_embedding_client(
    config: &EmbeddingConfig,
    dimension: usize,
) -> Result<Box<dyn EmbeddingClient>> {
    tracing::debug!(provider = ?config.provider, model = %config.model, dimension, "creating embedding client");
    match config.provider {
        EmbeddingProvider::OpenAI => Ok(Box::new(
            OpenAiEmbedding::from_config(config)?.with_dimension(dimension),
        )),
        EmbeddingProvider::Azure => Ok(Box::new(
            AzureOpenAiEmbedding::from_config(config)?.with_dimension(dimension),
        )),
        EmbeddingProvider::Ollama => Ok(Box::new(
            OllamaEmbedding::from_config(config)?.with_dimension(dimension),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
