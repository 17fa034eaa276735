//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::downloader::download_model;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel,
};
use fnv::FnvHasher;
use half::f16;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::fs;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a result, inferring the dimension from the first vector (0 when empty).
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts, preserving input order
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Dimension of the vectors produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Identifier of the underlying model, recorded alongside built indexes
    fn model_name(&self) -> &str {
        self.provider_name()
    }
}

/// Map a configured model name to a fastembed built-in model.
///
/// Names are matched case-insensitively, with or without the organisation
/// prefix used on the HuggingFace Hub.
pub fn builtin_model(name: &str) -> Option<EmbeddingModel> {
    let name = name.to_ascii_lowercase();
    let short = name.rsplit('/').next().unwrap_or(&name);
    match short {
        "all-minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        _ => None,
    }
}

/// Cached model entries: (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Models are expensive to load, so they are shared across providers with equal configs
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn model_cache() -> MutexGuard<'static, HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_model(model: &Mutex<TextEmbedding>) -> Result<MutexGuard<'_, TextEmbedding>> {
    model
        .lock()
        .map_err(|_| EmbedError::invalid_config("embedding model lock poisoned"))
}

/// FastEmbed-based embedding provider running ONNX models locally
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Create an uninitialized provider. Call [`initialize`](Self::initialize)
    /// before embedding, or use [`create`](Self::create).
    pub fn new(config: EmbedConfig) -> Self {
        Self {
            config,
            model: None,
            dimension: 0,
        }
    }

    /// Download (if needed) and load the model, reusing a cached instance when possible.
    pub async fn initialize(&mut self) -> Result<()> {
        self.config.validate_settings()?;
        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            self.config.model_name
        );

        let cache_key = self.create_cache_key();
        let cached = model_cache()
            .get(&cache_key)
            .map(|(model, dim)| (Arc::clone(model), *dim));

        let (model, dimension) = match cached {
            Some(entry) => {
                tracing::info!("Using cached model for: {}", self.config.model_name);
                entry
            }
            None => {
                let (model, dimension) = if self.config.is_huggingface_model() {
                    download_model(&self.config).await?;
                    self.load_user_defined_model().await?
                } else {
                    self.load_builtin_model().await?
                };
                let model = Arc::new(Mutex::new(model));
                model_cache().insert(cache_key, (Arc::clone(&model), dimension));
                (model, dimension)
            }
        };

        self.model = Some(model);
        self.dimension = dimension;
        self.validate_model().await
    }

    /// Create and initialize a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    fn create_cache_key(&self) -> String {
        let config_json = serde_json::to_string(&self.config)
            .unwrap_or_else(|_| format!("{:?}", self.config));

        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(config_json.as_bytes());

        format!("v1:{:x}", hasher.finish())
    }

    async fn load_builtin_model(&self) -> Result<(TextEmbedding, usize)> {
        let model_kind = builtin_model(&self.config.model_name).ok_or_else(|| {
            EmbedError::invalid_config(format!(
                "Unknown built-in model '{}'; set hf_model_repo to load it from HuggingFace",
                self.config.model_name
            ))
        })?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
            tracing::info!("Loading embedding model: {}", config.model_name);

            let init_options = InitOptions::new(model_kind)
                .with_cache_dir(config.model_base_path.clone())
                .with_show_download_progress(true);
            let mut model = TextEmbedding::try_new(init_options)
                .map_err(|source| EmbedError::External { source })?;

            let dimension = probe_dimension(&mut model)?;
            tracing::info!("Model loaded successfully. Dimension: {}", dimension);
            Ok((model, dimension))
        })
        .await?
    }

    /// Load a user-defined ONNX model from downloaded HuggingFace files
    async fn load_user_defined_model(&self) -> Result<(TextEmbedding, usize)> {
        let tokenizer_config = self.config.tokenizer_config();

        let onnx_file = fs::read(self.config.onnx_model_path()).await?;
        let tokenizer_file = fs::read(&tokenizer_config.tokenizer_path).await?;
        let config_file = fs::read(&tokenizer_config.config_path).await?;
        let special_tokens_map_file = fs::read(&tokenizer_config.special_tokens_map_path).await?;
        let tokenizer_config_file = match &tokenizer_config.tokenizer_config_path {
            Some(path) if path.exists() => fs::read(path).await?,
            _ => minimal_tokenizer_config()?,
        };

        let user_model = UserDefinedEmbeddingModel::new(
            onnx_file,
            TokenizerFiles {
                tokenizer_file,
                config_file,
                special_tokens_map_file,
                tokenizer_config_file,
            },
        );

        let model_name = self.config.model_name.clone();
        tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
            tracing::info!("Initializing user-defined model: {}", model_name);

            let mut model =
                TextEmbedding::try_new_from_user_defined(user_model, Default::default())
                    .map_err(|source| EmbedError::External { source })?;

            let dimension = probe_dimension(&mut model)?;
            tracing::info!(
                "User-defined model loaded successfully. Dimension: {}",
                dimension
            );
            Ok((model, dimension))
        })
        .await?
    }

    /// Validate that the loaded model produces finite vectors of the expected size
    async fn validate_model(&self) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| EmbedError::invalid_config("Model not initialized"))?;

        let embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            lock_model(&model)?
                .embed(vec!["validation test".to_string()], None)
                .map_err(|source| EmbedError::External { source })
        })
        .await??;

        let embedding = embeddings.first().ok_or_else(|| {
            EmbedError::invalid_config("Model validation failed: no embeddings generated")
        })?;
        if embedding.len() != self.dimension {
            return Err(EmbedError::invalid_config(format!(
                "Model validation failed: expected dimension {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(EmbedError::invalid_config(
                "Model validation failed: non-finite values in embedding",
            ));
        }

        tracing::debug!("Model validation passed for: {}", self.config.model_name);
        Ok(())
    }

    /// Drop every cached model.
    pub fn clear_cache() {
        model_cache().clear();
        tracing::info!("Model cache cleared");
    }

    pub fn cache_size() -> usize {
        model_cache().len()
    }

    fn convert_to_f16(&self, embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
        embeddings
            .into_iter()
            .map(|embedding| {
                if self.config.normalize {
                    normalize_to_f16(&embedding)
                } else {
                    embedding.into_iter().map(f16::from_f32).collect()
                }
            })
            .collect()
    }
}

fn probe_dimension(model: &mut TextEmbedding) -> Result<usize> {
    let probe = model
        .embed(vec!["test".to_string()], None)
        .map_err(|source| EmbedError::External { source })?;
    probe
        .first()
        .map(|e| e.len())
        .filter(|&d| d > 0)
        .ok_or_else(|| EmbedError::invalid_config("model produced an empty embedding"))
}

fn minimal_tokenizer_config() -> Result<Vec<u8>> {
    let minimal = serde_json::json!({
        "clean_up_tokenization_spaces": true,
        "do_lower_case": false,
        "model_max_length": 512,
        "tokenizer_class": "BertTokenizer"
    });
    serde_json::to_vec_pretty(&minimal).map_err(|e| EmbedError::External { source: e.into() })
}

/// L2-normalize an f32 vector and convert it to f16. Zero vectors stay zero.
pub fn normalize_to_f16(values: &[f32]) -> Vec<f16> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    values
        .iter()
        .map(|&v| f16::from_f32(if norm > 0.0 { v / norm } else { v }))
        .collect()
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.model.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })?;

        tracing::debug!("Generating embeddings for {} texts", texts.len());
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let model = Arc::clone(model);

            let batch_embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                tracing::debug!("Processing batch of {} texts", batch.len());
                lock_model(&model)?
                    .embed(batch, None)
                    .map_err(|source| EmbedError::External { source })
            })
            .await??;

            all_embeddings.extend(self.convert_to_f16(batch_embeddings));
        }

        if all_embeddings.len() != texts.len() {
            return Err(EmbedError::invalid_config(format!(
                "expected {} embeddings, model returned {}",
                texts.len(),
                all_embeddings.len()
            )));
        }
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_result() {
        let embeddings = vec![
            vec![f16::from_f32(0.1), f16::from_f32(0.2), f16::from_f32(0.3)],
            vec![f16::from_f32(0.4), f16::from_f32(0.5), f16::from_f32(0.6)],
        ];
        let result = EmbeddingResult::new(embeddings);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert_eq!(EmbeddingResult::new(vec![]).dimension, 0);
    }

    #[test]
    fn test_builtin_model_names() {
        assert!(matches!(
            builtin_model("all-MiniLM-L6-v2"),
            Some(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            builtin_model("sentence-transformers/all-MiniLM-L6-v2"),
            Some(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            builtin_model("BAAI/bge-small-en-v1.5"),
            Some(EmbeddingModel::BGESmallENV15)
        ));
        assert!(builtin_model("not-a-model").is_none());
    }

    #[test]
    fn test_normalize_to_f16() {
        let v = normalize_to_f16(&[3.0, 4.0]);
        assert!((v[0].to_f32() - 0.6).abs() < 1e-3);
        assert!((v[1].to_f32() - 0.8).abs() < 1e-3);

        let zero = normalize_to_f16(&[0.0, 0.0]);
        assert!(zero.iter().all(|x| x.to_f32() == 0.0));
    }

    #[test]
    fn test_convert_respects_normalize_flag() {
        let raw = vec![vec![3.0f32, 4.0]];
        let normalized = FastEmbedProvider::new(EmbedConfig::default()).convert_to_f16(raw.clone());
        assert!((normalized[0][0].to_f32() - 0.6).abs() < 1e-3);

        let plain = FastEmbedProvider::new(EmbedConfig::default().with_normalize(false))
            .convert_to_f16(raw);
        assert_eq!(plain[0][0].to_f32(), 3.0);
    }

    #[tokio::test]
    async fn test_uninitialized_provider_rejects_embedding() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());
        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.model_name(), "all-MiniLM-L6-v2");

        let empty = provider.embed_texts(&[]).await.unwrap();
        assert!(empty.is_empty());

        let err = provider.embed_text("hello").await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_unknown_builtin_model_fails_to_initialize() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = EmbedConfig::new(temp_dir.path(), "no-such-model");
        let err = FastEmbedProvider::create(config).await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    #[test]
    fn test_cache_key_generation() {
        let key1 = FastEmbedProvider::new(EmbedConfig::default()).create_cache_key();
        let key2 = FastEmbedProvider::new(EmbedConfig::default()).create_cache_key();
        assert_eq!(key1, key2, "Same config should produce same cache key");
        assert!(key1.starts_with("v1:"));

        let other = FastEmbedProvider::new(EmbedConfig::new("models", "bge-small-en-v1.5"))
            .create_cache_key();
        assert_ne!(key1, other);

        let unnormalized =
            FastEmbedProvider::new(EmbedConfig::default().with_normalize(false)).create_cache_key();
        assert_ne!(key1, unnormalized);
    }

    #[tokio::test]
    #[ignore] // Downloads all-MiniLM-L6-v2; run with: cargo test -p docqa-embed -- --ignored
    async fn test_minilm_download_and_embedding() -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();

        let temp_dir = tempfile::tempdir()?;
        let provider = FastEmbedProvider::create(EmbedConfig::default_with_path(temp_dir.path()))
            .await?;
        assert_eq!(provider.embedding_dimension(), 384);

        let texts = vec![
            "AI models analyze medical images.".to_string(),
            "Machine learning helps radiologists read X-rays.".to_string(),
            "The recipe needs two cups of flour.".to_string(),
        ];
        let result = provider.embed_texts(&texts).await?;
        assert_eq!(result.len(), 3);

        let dot = |a: &[f16], b: &[f16]| -> f32 {
            a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
        };
        let related = dot(&result.embeddings[0], &result.embeddings[1]);
        let unrelated = dot(&result.embeddings[0], &result.embeddings[2]);
        assert!(related > unrelated);

        let again = FastEmbedProvider::create(EmbedConfig::default_with_path(temp_dir.path()))
            .await?;
        assert_eq!(again.embed_text("hi").await?.len(), 384);
        FastEmbedProvider::clear_cache();
        assert_eq!(FastEmbedProvider::cache_size(), 0);
        Ok(())
    }
}
