//! # docqa-embed
//!
//! Text embeddings for the document question-answering pipeline. Chunks and
//! questions are turned into dense `f16` vectors that the retriever indexes and
//! searches.
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: local ONNX models through fastembed. Built-in
//!   sentence-transformers models are selected by name; any other ONNX export
//!   is downloaded from the HuggingFace Hub by [`ModelDownloader`].
//! - [`HashingProvider`]: deterministic feature hashing, no model required.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docqa_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> docqa_embed::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default_with_path("/tmp/models")).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Caching
//!
//! Loaded fastembed models are kept in a process-wide cache keyed by a hash of
//! the configuration, so rebuilding a provider with the same settings is cheap.

pub mod config;
pub mod downloader;
pub mod error;
pub mod hashing;
pub mod provider;

pub use config::{DEFAULT_MODEL_NAME, EmbedConfig, TokenizerConfig};
pub use downloader::{ModelDownloader, download_model};
pub use error::{EmbedError, Result};
pub use hashing::HashingProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
