//! Ollama embedding provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use recall_protocols::{Embedding, EmbeddingError, EmbeddingProvider};

/// Configuration for Ollama embeddings.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    /// Server URL (default: http://localhost:11434).
    pub base_url: String,
    /// Model to use (default: mxbai-embed-large).
    pub model: String,
    /// Embedding dimension (default: 1024 for mxbai-embed-large).
    pub dimension: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Input is truncated to this many characters.
    pub max_chars: usize,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "mxbai-embed-large".to_string(),
            dimension: 1024,
            timeout: Duration::from_secs(30),
            max_chars: 2000,
        }
    }
}

impl OllamaEmbeddingConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = dim;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

/// Ollama embedding provider.
pub struct OllamaEmbedding {
    client: reqwest::Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedding {
    pub fn new(config: OllamaEmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Failed(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OllamaEmbeddingConfig {
        &self.config
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.config.max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            prompt: self.truncate(text),
        };
        let url = format!("{}/api/embeddings", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    EmbeddingError::Unavailable(e.to_string())
                } else {
                    EmbeddingError::Failed(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::Failed(format!(
                "API error {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Failed(format!("Parse error: {}", e)))?;

        if parsed.embedding.len() != self.config.dimension {
            return Err(EmbeddingError::Failed(format!(
                "expected {} dimensions, model returned {}",
                self.config.dimension,
                parsed.embedding.len()
            )));
        }

        debug!(model = %self.config.model, chars = request.prompt.len(), "Generated embedding");
        Ok(Embedding::new(parsed.embedding))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
#[path = "ollama_tests.rs"]
mod tests;
