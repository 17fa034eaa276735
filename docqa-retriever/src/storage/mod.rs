//! Persistence for the knowledge base.
//!
//! Two artifacts make up a built knowledge base:
//!
//! - the [`FlatL2Index`](flat_index::FlatL2Index) file holding one vector per chunk, and
//! - a [`ChunkStore`] holding the chunk texts in index-position order, the
//!   document records and the build metadata.
//!
//! Position `i` in the index always refers to the chunk stored with
//! `position == i`. Both artifacts are replaced together on every build.
//!
//! ## Architecture
//!
//! ```text
//! KnowledgeBase ─┬─ FlatL2Index ── document_qa_index.flat
//!                └─ ChunkStore ─── SqliteStore ── .docqa.db
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod flat_index;
pub mod sqlite_store;

/// Blake3 hash of a document's extracted text (32 bytes).
pub type DocumentHash = [u8; 32];

/// A document that contributed chunks to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Position of the document in build order
    pub id: i64,
    pub name: String,
    pub text_hash: DocumentHash,
    pub char_count: usize,
    pub chunk_count: usize,
}

/// A chunk text at a fixed index position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredChunk {
    pub position: usize,
    pub document_id: i64,
    pub source: String,
    pub sequence: usize,
    pub content: String,
}

/// Facts about the last successful build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeBaseMetadata {
    /// Snapshot hash of the documents directory the index was built from
    pub content_hash: String,
    pub document_count: usize,
    pub chunk_count: usize,
    pub dimension: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub built_at: DateTime<Utc>,
}

/// Storage for chunk texts and build metadata.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Atomically replace all documents, chunks and metadata.
    async fn replace_all(
        &self,
        documents: &[DocumentRecord],
        chunks: &[StoredChunk],
        metadata: &KnowledgeBaseMetadata,
    ) -> Result<()>;

    /// All chunks ordered by position
    async fn load_chunks(&self) -> Result<Vec<StoredChunk>>;

    /// Chunks at the given positions, in the order requested. Unknown
    /// positions are skipped.
    async fn get_chunks(&self, positions: &[usize]) -> Result<Vec<StoredChunk>>;

    /// The first `limit` chunks ordered by position
    async fn list_chunks(&self, limit: usize) -> Result<Vec<StoredChunk>>;

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>>;

    async fn chunk_count(&self) -> Result<usize>;

    async fn metadata(&self) -> Result<Option<KnowledgeBaseMetadata>>;

    /// Remove everything
    async fn clear(&self) -> Result<()>;
}
