//! Embedding backends for semantic search
//!
//! Embeddings turn a query, a posting or a resume into a dense vector so the
//! store can rank by cosine similarity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{ProviderConfig, RetrievalConfig};
use crate::error::{JobscoutError, Result};

/// Error type for embedding operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Connection failures and 5xx responses
    #[error("Embedding request failed: {0}")]
    Http(String),

    /// 429 from the embedding service
    #[error("Embedding service rate limited the request")]
    RateLimited,

    /// 401/403 from the embedding service
    #[error("Embedding service rejected credentials")]
    AuthFailed,

    /// Unexpected response shape
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl EmbeddingError {
    /// Whether retrying the same input could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::RateLimited)
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        EmbeddingError::Http(e.to_string())
    }
}

/// Something that can embed text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name, for logs
    fn model_name(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts, preserving order
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

/// OpenAI-compatible `/embeddings` client
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    /// Create a client against `base_url` (for example `https://api.openai.com/v1`)
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| JobscoutError::Embedding(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding returned".to_string()))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut req = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(EmbeddingError::AuthFailed);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let err = format!("Status {}: {}", status, error_text);
            return Err(if status.is_server_error() {
                EmbeddingError::Http(err)
            } else {
                EmbeddingError::InvalidResponse(err)
            });
        }

        let mut result: EmbeddingResponse = response.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;
        if result.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }
        result.data.sort_by_key(|d| d.index);
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Deterministic bag-of-words embedder
///
/// Hashes lowercase words into a fixed number of buckets and normalizes, so
/// texts sharing vocabulary land close together. Needs no network, which
/// makes it suitable for offline job files and tests.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder producing vectors of `dimension` components
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a keeps buckets stable across runs and platforms
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimension as u64) as usize
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let mut embedding = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 1)
        {
            embedding[self.bucket(&word.to_lowercase())] += 1.0;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for x in &mut embedding {
                *x /= magnitude;
            }
        }
        Ok(embedding)
    }
}

/// Build the embedder named in configuration
///
/// # Errors
///
/// Returns error for an unknown embedder name
pub fn create_embedder(
    retrieval: &RetrievalConfig,
    provider: &ProviderConfig,
) -> Result<std::sync::Arc<dyn Embedder>> {
    match retrieval.embedder.as_str() {
        "openai" => {
            let base_url = if provider.provider_type == "openai" {
                provider.resolved_base_url()
            } else {
                "https://api.openai.com/v1".to_string()
            };
            Ok(std::sync::Arc::new(OpenAiEmbeddings::new(
                base_url,
                provider.api_key(),
                retrieval.embedding_model.clone(),
            )?))
        }
        "hash" => Ok(std::sync::Arc::new(HashEmbedder::default())),
        other => Err(JobscoutError::Config(format!("Unknown embedder: {}", other)).into()),
    }
}

/// Cosine similarity of two vectors, `None` when undefined
///
/// # Examples
///
/// ```
/// use jobscout::retrieval::cosine_similarity;
///
/// let s = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
/// assert!((s - 1.0).abs() < 1e-9);
/// assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_none());
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_is_normalized_and_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("Senior Rust engineer").await.unwrap();
        let b = embedder.embed("senior rust ENGINEER").await.unwrap();
        assert_eq!(a, b);
        let magnitude: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_hash_embedder_prefers_shared_vocabulary() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed("data scientist python").await.unwrap();
        let close = embedder
            .embed("We are hiring a data scientist fluent in python")
            .await
            .unwrap();
        let far = embedder
            .embed("Line cook for a busy downtown restaurant")
            .await
            .unwrap();
        let close_score = cosine_similarity(&query, &close).unwrap();
        let far_score = cosine_similarity(&query, &far).unwrap_or(0.0);
        assert!(close_score > far_score);
    }

    #[tokio::test]
    async fn test_hash_embedder_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
        assert!(cosine_similarity(&v, &v).is_none());
    }

    #[tokio::test]
    async fn test_default_embed_batch_preserves_order() {
        let embedder = HashEmbedder::new(16);
        let texts = vec!["rust".to_string(), "python".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("rust").await.unwrap());
        assert_eq!(batch[1], embedder.embed("python").await.unwrap());
    }

    #[test]
    fn test_transient_classification() {
        assert!(EmbeddingError::Http("reset".into()).is_transient());
        assert!(EmbeddingError::RateLimited.is_transient());
        assert!(!EmbeddingError::AuthFailed.is_transient());
    }

    #[test]
    fn test_create_embedder_unknown() {
        let retrieval = RetrievalConfig {
            embedder: "word2vec".to_string(),
            ..Default::default()
        };
        assert!(create_embedder(&retrieval, &ProviderConfig::default()).is_err());
    }
}
