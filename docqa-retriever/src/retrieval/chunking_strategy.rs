use anyhow::Result;
use docqa_context::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TextChunk, TextSplitter};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::extract::DocumentKind;

/// Configuration for chunking documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum size of each chunk in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }
}

/// Strategy for chunking documents - delegates entirely to docqa-context
#[derive(Debug, Clone)]
pub struct ChunkingStrategy {
    splitter: TextSplitter,
}

impl ChunkingStrategy {
    /// Create a new chunking strategy, rejecting inconsistent sizes
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self { splitter })
    }

    /// Chunk the text of one document
    pub fn chunk_content(&self, source: &str, content: &str) -> Vec<TextChunk> {
        let chunks = self.splitter.split_document(source, content);

        tracing::debug!(
            "Chunked {} into {} chunks (size: {}, overlap: {})",
            source,
            chunks.len(),
            self.splitter.chunk_size(),
            self.splitter.chunk_overlap()
        );

        chunks
    }

    pub fn chunk_size(&self) -> usize {
        self.splitter.chunk_size()
    }

    pub fn chunk_overlap(&self) -> usize {
        self.splitter.chunk_overlap()
    }

    /// Check if a file should be indexed based on its path
    pub fn should_index_file(file_path: &Path) -> bool {
        // Editor backups; swap files already fail the extension check
        if let Some(filename) = file_path.file_name().and_then(|n| n.to_str()) {
            if filename.ends_with('~') {
                return false;
            }
        }

        DocumentKind::from_path(file_path).is_some()
    }
}
