//! Embedding boundary.
//!
//! Embedding computation is external to the engine: a pure `text -> vector`
//! function that must be deterministic for identical input within one corpus
//! version. Queries must use the same model the corpus was built with;
//! mixing models is a configuration error and surfaces as a dimension
//! mismatch at the index.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from computing an embedding.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Embedding API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A provider that turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. Deterministic for identical input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Dimensionality of the vectors this provider produces.
    fn dimension(&self) -> usize;
}

/// Default OpenAI-compatible embeddings endpoint.
const DEFAULT_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default embedding model.
const DEFAULT_EMBEDDINGS_MODEL: &str = "text-embedding-3-small";

/// Default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSION: usize = 1536;

/// An [`Embedder`] backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl HttpEmbedder {
    /// Create an embedder for the given endpoint URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            model: DEFAULT_EMBEDDINGS_MODEL.to_string(),
            api_key: None,
            dimension: DEFAULT_DIMENSION,
        }
    }

    /// Create an embedder from `FOLIO_EMBEDDINGS_URL`, `FOLIO_EMBEDDINGS_MODEL`
    /// and `FOLIO_EMBEDDINGS_API_KEY` environment variables.
    pub fn from_env() -> Result<Self, EmbedError> {
        let url =
            std::env::var("FOLIO_EMBEDDINGS_URL").unwrap_or_else(|_| DEFAULT_EMBEDDINGS_URL.into());
        let mut embedder = Self::new(url);
        if let Ok(model) = std::env::var("FOLIO_EMBEDDINGS_MODEL") {
            embedder.model = model;
        }
        if let Ok(key) = std::env::var("FOLIO_EMBEDDINGS_API_KEY") {
            if key.is_empty() {
                return Err(EmbedError::Config(
                    "FOLIO_EMBEDDINGS_API_KEY is set but empty".into(),
                ));
            }
            embedder.api_key = Some(key);
        }
        Ok(embedder)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the bearer API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the expected output dimensionality.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbedError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api(format!("status {status}: {detail}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Api(format!("unparseable response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::Api("empty embedding response".into()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// A deterministic, offline embedder: hashed token counts, L2-normalized.
///
/// Not a semantic model. Texts sharing vocabulary score close; that is
/// enough for tests and for corpora built with the same stand-in.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a, stable across platforms and runs.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.dimension as u64) as usize
    }

    /// Synchronous embedding, usable from non-async test setup.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket(&token.to_lowercase())] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed_sync("what light through yonder window breaks");
        let b = embedder.embed_sync("what light through yonder window breaks");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embedder_dimension() {
        let embedder = HashEmbedder::new(48);
        assert_eq!(embedder.dimension(), 48);
        assert_eq!(embedder.embed_sync("soft you now").len(), 48);
    }

    #[test]
    fn test_hash_embedder_normalized() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed_sync("the fair Ophelia");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_empty_text_is_zero() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed_sync("");
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_scores_closer() {
        let embedder = HashEmbedder::new(64);
        let query = embedder.embed_sync("love and the heart");
        let near = embedder.embed_sync("my heart is full of love");
        let far = embedder.embed_sync("draw thy sword and fight");

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&query, &near) > dot(&query, &far));
    }
}
