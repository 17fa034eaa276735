//! Application configuration loaded from `docqa.toml`.
//!
//! Every section and field has a default, so an empty file (or no file at all)
//! gives a working setup: documents in `./documents`, 500/50 character chunks,
//! the `all-MiniLM-L6-v2` embedding model, top-3 retrieval and the extractive
//! answerer.

use crate::retrieval::chunking_strategy::ChunkingConfig;
use anyhow::{Context, Result, bail};
use docqa_embed::{DEFAULT_MODEL_NAME, EmbedConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the workspace when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "docqa.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub answer: AnswerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where documents and index artifacts live.
///
/// Relative paths are resolved against `workspace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    #[serde(default = "default_index_file")]
    pub index_file: PathBuf,

    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("documents")
}

fn default_index_file() -> PathBuf {
    PathBuf::from("document_qa_index.flat")
}

fn default_database_file() -> PathBuf {
    PathBuf::from(".docqa.db")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            documents_dir: default_documents_dir(),
            index_file: default_index_file(),
            database_file: default_database_file(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Fastembed,
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingBackend,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Directory for downloaded model files
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// HuggingFace repository of a user-defined ONNX model
    #[serde(default)]
    pub hf_repo: Option<String>,

    #[serde(default)]
    pub hf_revision: Option<String>,

    #[serde(default)]
    pub onnx_file: Option<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_normalize")]
    pub normalize: bool,

    /// Bucket count of the hashing provider
    #[serde(default = "default_hashing_dimension")]
    pub hashing_dimension: usize,
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_batch_size() -> usize {
    32
}

fn default_normalize() -> bool {
    true
}

fn default_hashing_dimension() -> usize {
    docqa_embed::hashing::DEFAULT_HASHING_DIMENSION
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::default(),
            model_name: default_model_name(),
            cache_dir: default_cache_dir(),
            hf_repo: None,
            hf_revision: None,
            onnx_file: None,
            batch_size: default_batch_size(),
            normalize: default_normalize(),
            hashing_dimension: default_hashing_dimension(),
        }
    }
}

impl EmbeddingSettings {
    /// The fastembed configuration described by these settings.
    pub fn to_embed_config(&self, workspace: &Path) -> EmbedConfig {
        let base = resolve(workspace, &self.cache_dir);
        let mut config = match &self.hf_repo {
            Some(repo) => EmbedConfig::from_huggingface(base, &self.model_name, repo),
            None => EmbedConfig::new(base, &self.model_name),
        };
        if let Some(revision) = &self.hf_revision {
            config = config.with_revision(revision);
        }
        if let Some(onnx_file) = &self.onnx_file {
            config = config.with_onnx_file(onnx_file);
        }
        config
            .with_batch_size(self.batch_size)
            .with_normalize(self.normalize)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the answer model
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerBackend {
    #[default]
    Extractive,
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerConfig {
    #[serde(default)]
    pub backend: AnswerBackend,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            backend: AnswerBackend::default(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Write the sample `news.txt` when the documents directory lacks it
    #[serde(default = "default_seed_demo")]
    pub seed_demo: bool,

    /// Debounce duration for the documents watcher (ms)
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

fn default_seed_demo() -> bool {
    true
}

fn default_watch_debounce_ms() -> u64 {
    500
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed_demo: default_seed_demo(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("In {}", path.display()))
    }

    /// Load `explicit` if given, else `docqa.toml` inside `workspace` when it
    /// exists, else the defaults.
    pub fn discover(explicit: Option<&Path>, workspace: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = workspace.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            tracing::debug!("Using configuration from {}", candidate.display());
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }

    pub fn with_workspace<P: Into<PathBuf>>(mut self, workspace: P) -> Self {
        self.paths.workspace = workspace.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be positive");
        }
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be positive");
        }
        if self.chunking.chunk_overlap > self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must not exceed chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be positive");
        }
        if self.embedding.hashing_dimension == 0 {
            bail!("embedding.hashing_dimension must be positive");
        }
        Ok(())
    }

    pub fn workspace(&self) -> &Path {
        &self.paths.workspace
    }

    pub fn documents_dir(&self) -> PathBuf {
        resolve(&self.paths.workspace, &self.paths.documents_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        resolve(&self.paths.workspace, &self.paths.index_file)
    }

    pub fn database_path(&self) -> PathBuf {
        resolve(&self.paths.workspace, &self.paths.database_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.provider, EmbeddingBackend::Fastembed);
        assert_eq!(config.answer.backend, AnswerBackend::Extractive);
        assert!(config.session.seed_demo);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml_str(
            r#"
            [paths]
            workspace = "/srv/qa"

            [embedding]
            provider = "hashing"
            hashing_dimension = 128

            [answer]
            backend = "ollama"
            ollama_model = "mistral"
            "#,
        )
        .unwrap();

        assert_eq!(config.documents_dir(), PathBuf::from("/srv/qa/documents"));
        assert_eq!(
            config.index_path(),
            PathBuf::from("/srv/qa/document_qa_index.flat")
        );
        assert_eq!(config.embedding.provider, EmbeddingBackend::Hashing);
        assert_eq!(config.embedding.hashing_dimension, 128);
        assert_eq!(config.embedding.model_name, DEFAULT_MODEL_NAME);
        assert_eq!(config.answer.backend, AnswerBackend::Ollama);
        assert_eq!(config.answer.ollama_model, "mistral");
        assert_eq!(config.answer.ollama_url, "http://localhost:11434");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(AppConfig::from_toml_str("[embedding]\nprovider = \"openai\"").is_err());
        assert!(AppConfig::from_toml_str("[retrieval]\ntop_k = 0").is_err());
        assert!(
            AppConfig::from_toml_str("[chunking]\nchunk_size = 10\nchunk_overlap = 20").is_err()
        );
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let mut config = AppConfig::default().with_workspace("/work");
        config.paths.database_file = PathBuf::from("/var/lib/docqa.db");
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/docqa.db"));
        assert_eq!(config.documents_dir(), PathBuf::from("/work/documents"));
    }

    #[test]
    fn test_discover_prefers_workspace_file() {
        let dir = tempdir().unwrap();
        assert_eq!(
            AppConfig::discover(None, dir.path()).unwrap(),
            AppConfig::default()
        );

        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[retrieval]\ntop_k = 5\n",
        )
        .unwrap();
        let config = AppConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config.retrieval.top_k, 5);

        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::discover(Some(&missing), dir.path()).is_err());
    }

    #[test]
    fn test_embed_config_mapping() {
        let mut settings = EmbeddingSettings {
            batch_size: 8,
            ..Default::default()
        };
        let config = settings.to_embed_config(Path::new("/ws"));
        assert_eq!(config.model_base_path, PathBuf::from("/ws/models"));
        assert_eq!(config.batch_size, 8);
        assert!(!config.is_huggingface_model());

        settings.hf_repo = Some("org/model".to_string());
        settings.hf_revision = Some("v1".to_string());
        let config = settings.to_embed_config(Path::new("/ws"));
        assert_eq!(config.hf_repo(), Some("org/model"));
        assert_eq!(config.hf_revision(), "v1");
    }
}
