//! HuggingFace model downloading functionality

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use hf_hub::api::tokio::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Downloads ONNX models and tokenizer files from the HuggingFace Hub
pub struct ModelDownloader {
    api: Api,
}

/// Ensure the model described by `config` is present locally.
///
/// Built-in models are fetched by fastembed itself, so this is a no-op for them.
pub async fn download_model(config: &EmbedConfig) -> Result<()> {
    if !config.is_huggingface_model() {
        return Ok(());
    }
    ModelDownloader::try_new()?.ensure_model(config).await
}

impl ModelDownloader {
    /// Create a downloader backed by the HuggingFace API client.
    ///
    /// The client picks up `HF_TOKEN` and the local hub cache from the environment.
    pub fn try_new() -> Result<Self> {
        let api = Api::new().map_err(EmbedError::model_init)?;
        Ok(Self { api })
    }

    /// Download a model from the Hub if it is not already complete locally.
    ///
    /// # Errors
    /// - Network or API errors for required files
    /// - File system errors when creating directories or copying files
    ///
    /// # Example
    /// ```no_run
    /// use docqa_embed::{EmbedConfig, ModelDownloader};
    ///
    /// # async fn example() -> docqa_embed::Result<()> {
    /// let config = EmbedConfig::from_huggingface(
    ///     "/tmp/models",
    ///     "all-mpnet-base-v2",
    ///     "sentence-transformers/all-mpnet-base-v2",
    /// );
    /// ModelDownloader::try_new()?.ensure_model(&config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn ensure_model(&self, config: &EmbedConfig) -> Result<()> {
        let repo_id = config
            .hf_repo()
            .ok_or_else(|| EmbedError::invalid_config("HuggingFace repository not specified"))?;

        if is_model_complete(config) {
            tracing::info!("Model {} already exists and is complete", config.model_name);
            return Ok(());
        }

        tracing::info!(
            "Downloading model {} from {} ({})",
            config.model_name,
            repo_id,
            config.hf_revision()
        );
        fs::create_dir_all(config.model_path()).await?;

        let repo = self.api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            config.hf_revision().to_string(),
        ));
        self.download_model_files(&repo, config).await?;

        tracing::info!("Model {} downloaded successfully", config.model_name);
        Ok(())
    }

    async fn download_model_files(&self, repo: &ApiRepo, config: &EmbedConfig) -> Result<()> {
        let tokenizer_config = &config.tokenizer_config;

        let mut downloads: Vec<(&str, PathBuf)> = vec![
            (config.onnx_file.as_str(), config.onnx_model_path()),
            ("tokenizer.json", tokenizer_config.tokenizer_path.clone()),
            ("config.json", tokenizer_config.config_path.clone()),
            (
                "special_tokens_map.json",
                tokenizer_config.special_tokens_map_path.clone(),
            ),
        ];
        if let Some(path) = &tokenizer_config.tokenizer_config_path {
            downloads.push(("tokenizer_config.json", path.clone()));
        }

        for (remote_path, local_path) in &downloads {
            if local_path.exists() {
                tracing::debug!("File already exists: {}", local_path.display());
                continue;
            }
            if let Some(parent) = local_path.parent() {
                fs::create_dir_all(parent).await?;
            }

            tracing::info!("Downloading {} to {}", remote_path, local_path.display());
            match repo.get(remote_path).await {
                Ok(cached) => {
                    fs::copy(&cached, local_path).await?;
                }
                Err(e) if *remote_path == "special_tokens_map.json" => {
                    tracing::warn!("Failed to download {}: {}", remote_path, e);
                    write_fallback_special_tokens_map(local_path).await?;
                }
                Err(e) if *remote_path == "tokenizer_config.json" => {
                    tracing::info!(
                        "tokenizer_config.json unavailable ({}), a minimal config will be generated",
                        e
                    );
                }
                Err(e) => return Err(EmbedError::External { source: e.into() }),
            }
        }

        Ok(())
    }
}

/// Whether every file the model needs is already on disk.
pub fn is_model_complete(config: &EmbedConfig) -> bool {
    let tokenizer_config = &config.tokenizer_config;
    let required = [
        config.onnx_model_path(),
        tokenizer_config.tokenizer_path.clone(),
        tokenizer_config.config_path.clone(),
        tokenizer_config.special_tokens_map_path.clone(),
    ];

    required.iter().all(|path| {
        let exists = path.exists();
        if !exists {
            tracing::debug!("Missing file: {}", path.display());
        }
        exists
    })
}

async fn write_fallback_special_tokens_map(path: &Path) -> Result<()> {
    let fallback = serde_json::json!({
        "cls_token": "[CLS]",
        "sep_token": "[SEP]",
        "unk_token": "[UNK]",
        "pad_token": "[PAD]",
        "mask_token": "[MASK]"
    });
    let content = serde_json::to_string_pretty(&fallback)
        .map_err(|e| EmbedError::External { source: e.into() })?;

    fs::write(path, content).await?;
    tracing::info!("Created fallback special_tokens_map.json");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_model_complete_missing_files() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::from_huggingface(temp_dir.path(), "mpnet", "org/mpnet");
        assert!(!is_model_complete(&config));
    }

    #[test]
    fn test_is_model_complete_without_optional_tokenizer_config() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::from_huggingface(temp_dir.path(), "mpnet", "org/mpnet");
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
        assert!(is_model_complete(&config));
    }

    #[tokio::test]
    async fn test_download_is_noop_for_builtin_models() -> Result<()> {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::default_with_path(temp_dir.path());
        download_model(&config).await?;
        assert!(!config.model_path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_fallback_special_tokens_map() -> Result<()> {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("special_tokens_map.json");
        write_fallback_special_tokens_map(&path).await?;

        let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)
            .map_err(|e| EmbedError::External { source: e.into() })?;
        assert_eq!(written["unk_token"], "[UNK]");
        Ok(())
    }
}
