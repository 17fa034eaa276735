//! Error types for the embedding layer

use std::path::PathBuf;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors raised while configuring, loading or running an embedding model.
///
/// # Error Categories
///
/// - **Configuration**: unknown model names, missing model files
/// - **Initialization**: the model or the HuggingFace client failed to load
/// - **Runtime**: inference failed or produced unusable vectors
/// - **IO / task**: filesystem access and blocking-task failures
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Model files are not present where the configuration says they are
    #[error("Model file not found: {path}")]
    ModelFileNotFound { path: PathBuf },

    /// Model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// The model could not be loaded
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Inference failed
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Errors bubbled up from fastembed and hf-hub
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Wrap an error raised while loading a model.
    pub fn model_init<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ModelInitialization {
            source: Box::new(source),
        }
    }

    /// Wrap an error raised while generating embeddings.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            source: Box::new(source),
        }
    }

    /// Create an invalid configuration error with a custom message.
    ///
    /// # Example
    /// ```
    /// use docqa_embed::EmbedError;
    ///
    /// let err = EmbedError::invalid_config("batch size must be positive");
    /// assert_eq!(
    ///     err.to_string(),
    ///     "Invalid model configuration: batch size must be positive"
    /// );
    /// ```
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
