//! A model-free embedding provider based on feature hashing.
//!
//! Every lower-cased alphanumeric token is hashed with FNV into one of
//! `dimension` buckets; a second hash bit decides the sign. The resulting
//! bag-of-words vector is L2-normalized. Texts that share words end up close
//! together, which is enough for offline use and for tests that must not
//! download a model.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, normalize_to_f16};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

pub const DEFAULT_HASHING_DIMENSION: usize = 384;

#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimension: usize,
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }
}

impl HashingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "hashing dimension must be positive",
            ));
        }
        Ok(Self { dimension })
    }

    fn embed_sync(&self, text: &str) -> Vec<f16> {
        let mut counts = vec![0f32; self.dimension];
        for token in tokenize(text) {
            let mut hasher = FnvHasher::default();
            hasher.write(token.as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            counts[bucket] += sign;
        }
        normalize_to_f16(&counts)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        tracing::debug!("Hashing {} texts into {} buckets", texts.len(), self.dimension);
        let embeddings = texts.iter().map(|t| self.embed_sync(t)).collect();
        Ok(EmbeddingResult {
            embeddings,
            dimension: self.dimension,
        })
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    fn dot(a: &[f16], b: &[f16]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let provider = HashingProvider::new();
        let a = block_on(provider.embed_text("Radiology and AI")).unwrap();
        let b = block_on(provider.embed_text("radiology AND ai!")).unwrap();

        assert_eq!(a.len(), DEFAULT_HASHING_DIMENSION);
        assert_eq!(a, b);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let provider = HashingProvider::with_dimension(256).unwrap();
        let texts = vec![
            "AI tools interpret medical imaging".to_string(),
            "medical imaging is interpreted by AI tools".to_string(),
            "bake bread with flour and water".to_string(),
        ];
        let result = block_on(provider.embed_texts(&texts)).unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result.dimension, 256);
        let related = dot(&result.embeddings[0], &result.embeddings[1]);
        let unrelated = dot(&result.embeddings[0], &result.embeddings[2]);
        assert!(related > unrelated);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = HashingProvider::with_dimension(8).unwrap();
        let v = provider.embed_text("  ... ").await.unwrap();
        assert_eq!(v.len(), 8);
        assert!(v.iter().all(|x| x.to_f32() == 0.0));
        assert!(HashingProvider::with_dimension(0).is_err());
    }
}
