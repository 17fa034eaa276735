//! SQLite implementation of [`ChunkStore`].
//!
//! ## Database Schema
//!
//! ```text
//! documents    (id, name, text_hash, char_count, chunk_count)
//! chunks       (position, document_id → documents.id, source, sequence, content)
//! kb_metadata  (single row: content_hash, counts, dimension, model, built_at)
//! ```
//!
//! `chunks.position` is the row of the chunk's vector in the flat index.

use super::{ChunkStore, DocumentRecord, KnowledgeBaseMetadata, StoredChunk};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: Option<PathBuf>,
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::new_with_pool(Some(path.to_path_buf()), pool).await
    }

    /// Opens an in-memory database for testing.
    pub async fn open_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so pin the pool
        // to one connection that never expires.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with("sqlite::memory:".parse::<SqliteConnectOptions>()?.foreign_keys(true))
            .await?;
        Self::new_with_pool(None, pool).await
    }

    async fn new_with_pool(path: Option<PathBuf>, pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { path, pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                text_hash BLOB NOT NULL,
                char_count INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                position INTEGER PRIMARY KEY,
                document_id INTEGER NOT NULL,
                source TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                content TEXT NOT NULL,
                CONSTRAINT unique_chunk UNIQUE(document_id, sequence),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kb_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                content_hash TEXT NOT NULL,
                document_count INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                dimension INTEGER NOT NULL,
                embedding_provider TEXT NOT NULL,
                embedding_model TEXT NOT NULL,
                built_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Location of the database file, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_chunk(row: &SqliteRow) -> StoredChunk {
        StoredChunk {
            position: row.get::<i64, _>("position") as usize,
            document_id: row.get("document_id"),
            source: row.get("source"),
            sequence: row.get::<i64, _>("sequence") as usize,
            content: row.get("content"),
        }
    }

    fn row_to_document(row: &SqliteRow) -> Result<DocumentRecord> {
        let hash: Vec<u8> = row.get("text_hash");
        let text_hash: [u8; 32] = hash
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid hash length in documents table"))?;
        Ok(DocumentRecord {
            id: row.get("id"),
            name: row.get("name"),
            text_hash,
            char_count: row.get::<i64, _>("char_count") as usize,
            chunk_count: row.get::<i64, _>("chunk_count") as usize,
        })
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn replace_all(
        &self,
        documents: &[DocumentRecord],
        chunks: &[StoredChunk],
        metadata: &KnowledgeBaseMetadata,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM kb_metadata")
            .execute(&mut *tx)
            .await?;

        for document in documents {
            sqlx::query(
                r#"
                INSERT INTO documents (id, name, text_hash, char_count, chunk_count)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(document.id)
            .bind(&document.name)
            .bind(&document.text_hash[..])
            .bind(document.char_count as i64)
            .bind(document.chunk_count as i64)
            .execute(&mut *tx)
            .await?;
        }

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (position, document_id, source, sequence, content)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.position as i64)
            .bind(chunk.document_id)
            .bind(&chunk.source)
            .bind(chunk.sequence as i64)
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO kb_metadata (id, content_hash, document_count, chunk_count, dimension,
                                     embedding_provider, embedding_model, built_at)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metadata.content_hash)
        .bind(metadata.document_count as i64)
        .bind(metadata.chunk_count as i64)
        .bind(metadata.dimension as i64)
        .bind(&metadata.embedding_provider)
        .bind(&metadata.embedding_model)
        .bind(metadata.built_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(
            "Stored {} documents and {} chunks",
            documents.len(),
            chunks.len()
        );
        Ok(())
    }

    async fn load_chunks(&self) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(
            "SELECT position, document_id, source, sequence, content FROM chunks ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_chunk).collect())
    }

    async fn get_chunks(&self, positions: &[usize]) -> Result<Vec<StoredChunk>> {
        let mut chunks = Vec::with_capacity(positions.len());
        for &position in positions {
            let row = sqlx::query(
                "SELECT position, document_id, source, sequence, content FROM chunks WHERE position = ?",
            )
            .bind(position as i64)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                chunks.push(Self::row_to_chunk(&row));
            }
        }
        Ok(chunks)
    }

    async fn list_chunks(&self, limit: usize) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(
            "SELECT position, document_id, source, sequence, content FROM chunks ORDER BY position LIMIT ?",
        )
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_chunk).collect())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, text_hash, char_count, chunk_count FROM documents ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_document).collect()
    }

    async fn chunk_count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("count") as usize)
    }

    async fn metadata(&self) -> Result<Option<KnowledgeBaseMetadata>> {
        let row = sqlx::query(
            r#"
            SELECT content_hash, document_count, chunk_count, dimension,
                   embedding_provider, embedding_model, built_at
            FROM kb_metadata WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| KnowledgeBaseMetadata {
            content_hash: row.get("content_hash"),
            document_count: row.get::<i64, _>("document_count") as usize,
            chunk_count: row.get::<i64, _>("chunk_count") as usize,
            dimension: row.get::<i64, _>("dimension") as usize,
            embedding_provider: row.get("embedding_provider"),
            embedding_model: row.get("embedding_model"),
            built_at: row.get("built_at"),
        }))
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM kb_metadata")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
