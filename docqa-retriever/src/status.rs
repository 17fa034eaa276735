//! Knowledge-base status report for the `status` command.
//!
//! Collecting status touches only the files and the chunk store, never the
//! embedding model, so it is cheap even when the model is not downloaded.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{AnswerBackend, AppConfig, EmbeddingBackend};
use crate::retrieval::scanner::scan_documents_async;
use crate::storage::{ChunkStore, KnowledgeBaseMetadata};

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseStatus {
    pub built: bool,
    /// Whether the documents on disk differ from what was indexed
    pub stale: bool,
    pub documents_dir: PathBuf,
    pub documents_on_disk: usize,
    pub index: ArtifactStatus,
    pub database: ArtifactStatus,
    pub metadata: Option<KnowledgeBaseMetadata>,
    pub documents: Vec<DocumentSummary>,
    pub config: ConfigSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: Option<u64>,
}

impl ArtifactStatus {
    async fn probe(path: &Path) -> Self {
        let size_bytes = tokio::fs::metadata(path).await.ok().map(|m| m.len());
        Self {
            path: path.to_path_buf(),
            exists: size_bytes.is_some(),
            size_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub name: String,
    pub chunks: usize,
    pub chars: usize,
    pub text_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embedding_provider: EmbeddingBackend,
    pub embedding_model: String,
    pub answer_backend: AnswerBackend,
}

impl ConfigSummary {
    fn from_config(config: &AppConfig) -> Self {
        let embedding_model = match config.embedding.provider {
            EmbeddingBackend::Fastembed => config.embedding.model_name.clone(),
            EmbeddingBackend::Hashing => {
                format!("feature-hashing/{}", config.embedding.hashing_dimension)
            }
        };
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            top_k: config.retrieval.top_k,
            embedding_provider: config.embedding.provider,
            embedding_model,
            answer_backend: config.answer.backend,
        }
    }
}

pub async fn collect_status(config: &AppConfig, store: &dyn ChunkStore) -> Result<KnowledgeBaseStatus> {
    let index = ArtifactStatus::probe(&config.index_path()).await;
    let database = ArtifactStatus::probe(&config.database_path()).await;
    let metadata = store.metadata().await?;
    let chunk_count = store.chunk_count().await?;

    let documents = store
        .list_documents()
        .await?
        .into_iter()
        .map(|doc| DocumentSummary {
            name: doc.name,
            chunks: doc.chunk_count,
            chars: doc.char_count,
            text_hash: hex::encode(doc.text_hash),
        })
        .collect();

    let snapshot = scan_documents_async(config.documents_dir()).await?;
    let stale = match &metadata {
        Some(metadata) => metadata.content_hash != snapshot.content_hash,
        None => !snapshot.is_empty(),
    };

    Ok(KnowledgeBaseStatus {
        built: index.exists && chunk_count > 0,
        stale,
        documents_dir: config.documents_dir(),
        documents_on_disk: snapshot.documents.len(),
        index,
        database,
        metadata,
        documents,
        config: ConfigSummary::from_config(config),
    })
}

impl KnowledgeBaseStatus {
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "Knowledge base: {}{}",
                if self.built { "built" } else { "not built" },
                if self.stale { " (documents changed since last build)" } else { "" }
            ),
            format!(
                "Documents directory: {} ({} documents)",
                self.documents_dir.display(),
                self.documents_on_disk
            ),
        ];
        if let Some(metadata) = &self.metadata {
            lines.push(format!(
                "Indexed: {} documents, {} chunks, dimension {} ({}/{})",
                metadata.document_count,
                metadata.chunk_count,
                metadata.dimension,
                metadata.embedding_provider,
                metadata.embedding_model
            ));
            lines.push(format!("Built at: {}", metadata.built_at.to_rfc3339()));
        }
        for artifact in [&self.index, &self.database] {
            lines.push(match artifact.size_bytes {
                Some(size) => format!("{}: {} bytes", artifact.path.display(), size),
                None => format!("{}: missing", artifact.path.display()),
            });
        }
        lines.push(format!(
            "Chunking: size {}, overlap {}; top_k {}; answers: {:?}",
            self.config.chunk_size,
            self.config.chunk_overlap,
            self.config.top_k,
            self.config.answer_backend
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite_store::SqliteStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_status_of_empty_workspace() -> Result<()> {
        let dir = tempdir()?;
        let config = AppConfig::default().with_workspace(dir.path());
        let store = SqliteStore::open_memory().await?;

        let status = collect_status(&config, &store).await?;
        assert!(!status.built);
        assert!(!status.stale);
        assert!(!status.index.exists);
        assert_eq!(status.documents_on_disk, 0);
        assert!(status.metadata.is_none());
        assert_eq!(status.config.top_k, 3);
        assert!(status.summary().contains("Knowledge base: not built"));

        std::fs::create_dir_all(config.documents_dir())?;
        std::fs::write(config.documents_dir().join("a.txt"), "text")?;
        let status = collect_status(&config, &store).await?;
        assert!(status.stale);
        assert_eq!(status.documents_on_disk, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_status_serializes() -> Result<()> {
        let dir = tempdir()?;
        let mut config = AppConfig::default().with_workspace(dir.path());
        config.embedding.provider = EmbeddingBackend::Hashing;
        let store = SqliteStore::open_memory().await?;

        let status = collect_status(&config, &store).await?;
        let json = serde_json::to_value(&status)?;
        assert_eq!(json["config"]["embedding_provider"], "hashing");
        assert_eq!(json["config"]["embedding_model"], "feature-hashing/384");
        assert_eq!(json["index"]["exists"], false);
        Ok(())
    }
}
