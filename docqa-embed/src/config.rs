//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the sentence-transformers model used when nothing else is configured.
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Location of tokenizer files for a user-defined ONNX model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(setter(into))]
pub struct TokenizerConfig {
    /// Path to the tokenizer.json file
    pub tokenizer_path: PathBuf,
    /// Path to the config.json file
    pub config_path: PathBuf,
    /// Path to the special_tokens_map.json file
    pub special_tokens_map_path: PathBuf,
    /// Path to the tokenizer_config.json file (optional, a minimal one is generated if missing)
    #[builder(default)]
    pub tokenizer_config_path: Option<PathBuf>,
}

impl TokenizerConfig {
    pub fn builder() -> TokenizerConfigBuilder {
        TokenizerConfigBuilder::default()
    }

    /// Tokenizer files laid out the way HuggingFace repositories store them.
    pub fn standard<P: AsRef<Path>>(model_dir: P) -> Self {
        let model_dir = model_dir.as_ref();
        Self {
            tokenizer_path: model_dir.join("tokenizer.json"),
            config_path: model_dir.join("config.json"),
            special_tokens_map_path: model_dir.join("special_tokens_map.json"),
            tokenizer_config_path: Some(model_dir.join("tokenizer_config.json")),
        }
    }

    /// Validate that all required tokenizer files exist
    pub fn validate(&self) -> Result<()> {
        let paths_to_check = [
            ("tokenizer", &self.tokenizer_path),
            ("config", &self.config_path),
            ("special tokens map", &self.special_tokens_map_path),
        ];

        for (name, path) in &paths_to_check {
            if !path.exists() {
                tracing::error!("Missing {}: {}", name, path.display());
                return Err(EmbedError::ModelFileNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        if let Some(path) = &self.tokenizer_config_path {
            if !path.exists() {
                tracing::warn!(
                    "tokenizer_config.json not found at {}, will generate minimal config",
                    path.display()
                );
            }
        }

        Ok(())
    }
}

/// Configuration for embedding models.
///
/// Two kinds of model are supported:
///
/// - **Built-in** models that fastembed knows by name (for example
///   `all-MiniLM-L6-v2`). They are fetched into `model_base_path` by fastembed.
/// - **HuggingFace** models: any repository with an ONNX export. Set
///   `hf_model_repo` and the files are downloaded into
///   `model_base_path/model_name` before loading.
///
/// # Example
/// ```
/// use docqa_embed::EmbedConfig;
///
/// let config = EmbedConfig::default_with_path("/tmp/models").with_batch_size(8);
/// assert_eq!(config.model_name, "all-MiniLM-L6-v2");
/// assert_eq!(config.batch_size, 8);
/// assert!(!config.is_huggingface_model());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Directory that holds downloaded model files
    #[builder(default = r#"PathBuf::from("models")"#)]
    pub model_base_path: PathBuf,
    /// Name of the embedding model to use
    pub model_name: String,
    /// HuggingFace model repository (e.g., "sentence-transformers/all-mpnet-base-v2")
    #[builder(default)]
    pub hf_model_repo: Option<String>,
    /// HuggingFace model revision/branch (e.g., "main")
    #[builder(default = r#"Some("main".to_string())"#)]
    pub hf_revision: Option<String>,
    /// Path of the ONNX file inside the HuggingFace repository
    #[builder(default = r#""onnx/model.onnx".to_string()"#)]
    pub onnx_file: String,
    /// Maximum batch size for embedding generation
    #[builder(default = "32")]
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    #[builder(default = "true")]
    pub normalize: bool,
    /// Tokenizer configuration (used by HuggingFace models only)
    pub tokenizer_config: TokenizerConfig,
}

impl EmbedConfig {
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Configuration for a built-in fastembed model.
    pub fn new<P: AsRef<Path>>(model_base_path: P, model_name: impl Into<String>) -> Self {
        let model_base_path = model_base_path.as_ref().to_path_buf();
        let model_name = model_name.into();
        let tokenizer_config = TokenizerConfig::standard(model_base_path.join(&model_name));
        Self {
            model_base_path,
            model_name,
            hf_model_repo: None,
            hf_revision: Some("main".to_string()),
            onnx_file: "onnx/model.onnx".to_string(),
            batch_size: 32,
            normalize: true,
            tokenizer_config,
        }
    }

    /// Configuration for an ONNX model hosted on the HuggingFace Hub.
    pub fn from_huggingface<P: AsRef<Path>>(
        model_base_path: P,
        model_name: impl Into<String>,
        hf_repo: impl Into<String>,
    ) -> Self {
        Self {
            hf_model_repo: Some(hf_repo.into()),
            batch_size: 16,
            ..Self::new(model_base_path, model_name)
        }
    }

    /// The default model stored under `model_base_path`.
    pub fn default_with_path<P: AsRef<Path>>(model_base_path: P) -> Self {
        Self::new(model_base_path, DEFAULT_MODEL_NAME)
    }

    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    pub fn with_revision<S: Into<String>>(self, revision: S) -> Self {
        Self {
            hf_revision: Some(revision.into()),
            ..self
        }
    }

    pub fn with_onnx_file<S: Into<String>>(self, onnx_file: S) -> Self {
        Self {
            onnx_file: onnx_file.into(),
            ..self
        }
    }

    /// Full path to the model directory
    pub fn model_path(&self) -> PathBuf {
        self.model_base_path.join(&self.model_name)
    }

    /// Local path of the ONNX model file
    pub fn onnx_model_path(&self) -> PathBuf {
        self.onnx_file
            .split('/')
            .fold(self.model_path(), |path, part| path.join(part))
    }

    pub fn tokenizer_config(&self) -> &TokenizerConfig {
        &self.tokenizer_config
    }

    pub fn is_huggingface_model(&self) -> bool {
        self.hf_model_repo.is_some()
    }

    pub fn hf_repo(&self) -> Option<&str> {
        self.hf_model_repo.as_deref()
    }

    pub fn hf_revision(&self) -> &str {
        self.hf_revision.as_deref().unwrap_or("main")
    }

    /// Check the settings that do not depend on files being present.
    pub fn validate_settings(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch size must be positive"));
        }
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        Ok(())
    }

    /// Validate settings, and for HuggingFace models that all files exist.
    pub fn validate(&self) -> Result<()> {
        self.validate_settings()?;
        if !self.is_huggingface_model() {
            return Ok(());
        }

        let onnx_path = self.onnx_model_path();
        if !onnx_path.exists() {
            tracing::error!("Missing ONNX model: {}", onnx_path.display());
            return Err(EmbedError::ModelFileNotFound { path: onnx_path });
        }
        self.tokenizer_config.validate()?;

        tracing::debug!("Model validation successful for: {}", self.model_name);
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::default_with_path("models")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_creation() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::new(temp_dir.path(), "test-model");

        assert_eq!(config.model_name, "test-model");
        assert_eq!(config.batch_size, 32);
        assert!(config.normalize);
        assert_eq!(config.model_path(), temp_dir.path().join("test-model"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_paths() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::from_huggingface(temp_dir.path(), "mpnet", "org/mpnet");

        let expected_base = temp_dir.path().join("mpnet");
        assert_eq!(
            config.onnx_model_path(),
            expected_base.join("onnx").join("model.onnx")
        );
        assert_eq!(
            config.tokenizer_config.tokenizer_path,
            expected_base.join("tokenizer.json")
        );
        assert_eq!(
            config.tokenizer_config.special_tokens_map_path,
            expected_base.join("special_tokens_map.json")
        );

        let quantized = config.with_onnx_file("onnx/model_quantized.onnx");
        assert_eq!(
            quantized.onnx_model_path(),
            expected_base.join("onnx").join("model_quantized.onnx")
        );
    }

    #[test]
    fn test_huggingface_validation_requires_files() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::from_huggingface(temp_dir.path(), "mpnet", "org/mpnet");
        assert!(config.is_huggingface_model());
        assert_eq!(config.hf_repo(), Some("org/mpnet"));
        assert_eq!(config.batch_size, 16);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, EmbedError::ModelFileNotFound { .. }));

        let model_dir = config.model_path();
        std::fs::create_dir_all(model_dir.join("onnx")).unwrap();
        for file in [
            "onnx/model.onnx",
            "tokenizer.json",
            "config.json",
            "special_tokens_map.json",
        ] {
            std::fs::write(model_dir.join(file), b"{}").unwrap();
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_methods() {
        let config = EmbedConfig::default()
            .with_batch_size(64)
            .with_normalize(false)
            .with_revision("v2");

        assert_eq!(config.batch_size, 64);
        assert!(!config.normalize);
        assert_eq!(config.hf_revision(), "v2");
        assert!(
            config
                .with_batch_size(0)
                .validate()
                .is_err_and(|e| matches!(e, EmbedError::InvalidConfig { .. }))
        );
    }

    #[test]
    fn test_builder_defaults() {
        let tokenizer_config = TokenizerConfig::standard(PathBuf::from("models").join("m"));

        let config = EmbedConfig::builder()
            .model_name("m")
            .tokenizer_config(tokenizer_config)
            .build()
            .unwrap();

        assert_eq!(config.model_base_path, PathBuf::from("models"));
        assert_eq!(config.batch_size, 32);
        assert!(config.normalize);
        assert_eq!(config.onnx_file, "onnx/model.onnx");
        assert_eq!(config.hf_revision, Some("main".to_string()));
        assert_eq!(config, EmbedConfig::new("models", "m"));
    }

    #[test]
    fn test_tokenizer_builder() {
        let temp_dir = tempdir().unwrap();
        let custom = TokenizerConfig::builder()
            .tokenizer_path(temp_dir.path().join("tok.json"))
            .config_path(temp_dir.path().join("cfg.json"))
            .special_tokens_map_path(temp_dir.path().join("special.json"))
            .build()
            .unwrap();

        assert_eq!(custom.tokenizer_config_path, None);
        assert!(custom.validate().is_err());

        std::fs::write(&custom.tokenizer_path, b"{}").unwrap();
        std::fs::write(&custom.config_path, b"{}").unwrap();
        std::fs::write(&custom.special_tokens_map_path, b"{}").unwrap();
        assert!(custom.validate().is_ok());
    }
}
