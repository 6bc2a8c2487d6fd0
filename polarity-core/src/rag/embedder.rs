//! Text-to-vector encoders.
//!
//! An encoder is a pure function of its input text for a fixed model. Each
//! encoder reports a `model_id` so persisted indexes can refuse to mix
//! vectors from different models.

use crate::provider::{ChatError, Provider};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The embedding endpoint returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ChatError),
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Converts text into fixed-dimension vectors.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Identity of the model producing the vectors.
    fn model_id(&self) -> &str;

    /// Length of every vector this encoder produces.
    fn dimension(&self) -> usize;

    /// Encode one piece of text.
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;
}

/// Encoder backed by a provider's embedding endpoint.
///
/// The declared dimension is what the store expects; a response of any other
/// length is rejected by the store, not here.
#[derive(Clone)]
pub struct ProviderEncoder {
    provider: Arc<dyn Provider>,
    model_id: String,
    dimension: usize,
}

impl ProviderEncoder {
    pub fn new(provider: Arc<dyn Provider>, model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            dimension,
        }
    }
}

#[async_trait]
impl Encoder for ProviderEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.provider
            .embed(text)
            .await
            .map_err(EmbedderError::Provider)
    }
}

/// Offline bag-of-words encoder using signed feature hashing.
///
/// Each lowercase word token is hashed with SHA-256; the first four bytes pick
/// a bucket and the fifth byte picks the sign. Texts sharing words end up
/// with positive cosine similarity, which is enough for offline runs and
/// tests, but it carries no semantics beyond word overlap.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    model_id: String,
    dimension: usize,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model_id: format!("hashing-sha256-{}", dimension),
            dimension,
        }
    }

    /// Encode synchronously; the vector is not normalised.
    pub fn encode_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        let lowered = text.to_lowercase();
        for token in tokens(&lowered) {
            let hash = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]) as usize
                % self.dimension;
            let sign = if hash[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

/// Word tokens: maximal runs of alphanumeric characters or underscores.
fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl Encoder for HashingEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::cosine_similarity;

    #[test]
    fn test_hashing_is_deterministic() {
        let encoder = HashingEncoder::new(128);
        assert_eq!(encoder.encode_sync("B causes C"), encoder.encode_sync("B causes C"));
        assert_eq!(encoder.model_id(), "hashing-sha256-128");
    }

    #[test]
    fn test_hashing_ignores_case_and_punctuation() {
        let encoder = HashingEncoder::new(128);
        assert_eq!(encoder.encode_sync("B causes C"), encoder.encode_sync("b CAUSES c!"));
    }

    #[test]
    fn test_hashing_handles_hangul() {
        let encoder = HashingEncoder::new(256);
        let a = encoder.encode_sync("정부의 책임이 크다");
        let b = encoder.encode_sync("정부의 책임이 있다");
        assert!(cosine_similarity(&a, &b) > 0.5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let encoder = HashingEncoder::new(16);
        assert!(encoder.encode_sync("").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_shared_words_rank_higher() {
        let encoder = HashingEncoder::new(256);
        let query = encoder.encode("What causes C?").await.unwrap();
        let near = encoder.encode("B causes C").await.unwrap();
        let far = encoder.encode("A causes B").await.unwrap();

        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }
}
