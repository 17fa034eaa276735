//! The retrieval-augmented QA pipeline.
//!
//! ```text
//! build:  documents → chunk → embed → FlatL2Index + ChunkStore
//! ask:    question → embed → search top-k → join chunks → AnswerModel
//! ```
//!
//! Building replaces both artifacts. Asking never returns an error: every
//! failure is logged and reported through [`RagResponse::status`] with a fixed
//! user-facing message, a score of 0 and an empty context.

use anyhow::{Context, Result, ensure};
use chrono::Utc;
use docqa_embed::{EmbeddingProvider, FastEmbedProvider, HashingProvider};
use itertools::Itertools;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::answer::{AnswerModel, ExtractiveAnswerer, OllamaAnswerer};
use super::chunking_strategy::ChunkingStrategy;
use super::scanner::{Document, DocumentSnapshot};
use crate::config::{AnswerBackend, AppConfig, EmbeddingBackend};
use crate::storage::flat_index::FlatL2Index;
use crate::storage::sqlite_store::SqliteStore;
use crate::storage::{ChunkStore, DocumentRecord, KnowledgeBaseMetadata, StoredChunk};

pub const NOT_BUILT_MESSAGE: &str =
    "Error: Knowledge base not built. Please upload documents and build the index.";
pub const LOAD_FAILED_MESSAGE: &str = "An error occurred while loading the knowledge base.";
pub const SEARCH_FAILED_MESSAGE: &str = "An error occurred while searching the knowledge base.";
pub const NO_CONTEXT_MESSAGE: &str = "No relevant context found in documents for your query. Please try a different query or upload more relevant documents.";
pub const GENERATION_FAILED_MESSAGE: &str = "An error occurred during answer generation.";

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Answered,
    NotBuilt,
    LoadFailed,
    SearchFailed,
    NoContext,
    GenerationFailed,
}

impl ResponseStatus {
    fn message(self) -> &'static str {
        match self {
            Self::Answered => "",
            Self::NotBuilt => NOT_BUILT_MESSAGE,
            Self::LoadFailed => LOAD_FAILED_MESSAGE,
            Self::SearchFailed => SEARCH_FAILED_MESSAGE,
            Self::NoContext => NO_CONTEXT_MESSAGE,
            Self::GenerationFailed => GENERATION_FAILED_MESSAGE,
        }
    }
}

/// A chunk that was handed to the answer model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub source: String,
    pub sequence: usize,
    pub position: usize,
    /// Squared L2 distance to the question
    pub distance: f32,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagResponse {
    pub answer: String,
    pub score: f32,
    pub context: String,
    pub sources: Vec<RetrievedChunk>,
    pub status: ResponseStatus,
}

impl RagResponse {
    fn failure(status: ResponseStatus) -> Self {
        Self {
            answer: status.message().to_string(),
            score: 0.0,
            context: String::new(),
            sources: Vec::new(),
            status,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.status == ResponseStatus::Answered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotBuiltReason {
    NoDocuments,
    NoChunks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    Built {
        documents: usize,
        chunks: usize,
        dimension: usize,
    },
    NotBuilt(NotBuiltReason),
}

impl BuildOutcome {
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built { .. })
    }
}

pub struct KnowledgeBase {
    index_path: PathBuf,
    store: Arc<dyn ChunkStore>,
    chunking: ChunkingStrategy,
    embedder: Arc<dyn EmbeddingProvider>,
    answerer: Arc<dyn AnswerModel>,
    top_k: usize,
}

impl KnowledgeBase {
    pub fn new(
        index_path: impl Into<PathBuf>,
        store: Arc<dyn ChunkStore>,
        chunking: ChunkingStrategy,
        embedder: Arc<dyn EmbeddingProvider>,
        answerer: Arc<dyn AnswerModel>,
    ) -> Self {
        Self {
            index_path: index_path.into(),
            store,
            chunking,
            embedder,
            answerer,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(self, top_k: usize) -> Self {
        Self { top_k, ..self }
    }

    /// Open the store and load the models named in `config`.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.database_path()).await?;
        let chunking = ChunkingStrategy::new(&config.chunking)?;
        let embedder = create_embedder(config).await?;
        let answerer = create_answerer(config, Arc::clone(&embedder))?;

        Ok(Self::new(
            config.index_path(),
            Arc::new(store),
            chunking,
            embedder,
            answerer,
        )
        .with_top_k(config.retrieval.top_k))
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn answerer(&self) -> &Arc<dyn AnswerModel> {
        &self.answerer
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Whether both artifacts of a build are present.
    pub async fn is_built(&self) -> bool {
        self.index_path.exists() && matches!(self.store.chunk_count().await, Ok(n) if n > 0)
    }

    /// Delete the index file and everything in the store.
    pub async fn clear(&self) -> Result<()> {
        if FlatL2Index::remove(&self.index_path).await? {
            info!("Removed stale index {}", self.index_path.display());
        }
        self.store.clear().await
    }

    /// Rebuild the knowledge base from `documents`.
    pub async fn build_index(&self, documents: &[Document]) -> Result<BuildOutcome> {
        self.build_with_hash(documents, &documents_hash(documents))
            .await
    }

    /// Rebuild from a directory snapshot, recording the snapshot hash.
    pub async fn build_from_snapshot(&self, snapshot: &DocumentSnapshot) -> Result<BuildOutcome> {
        self.build_with_hash(&snapshot.documents, &snapshot.content_hash)
            .await
    }

    async fn build_with_hash(&self, documents: &[Document], content_hash: &str) -> Result<BuildOutcome> {
        match self.try_build(documents, content_hash).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(clear_error) = self.clear().await {
                    warn!("Failed to remove artifacts after build error: {clear_error:#}");
                }
                Err(e)
            }
        }
    }

    async fn try_build(&self, documents: &[Document], content_hash: &str) -> Result<BuildOutcome> {
        if documents.is_empty() {
            info!("No documents to index.");
            self.clear().await?;
            return Ok(BuildOutcome::NotBuilt(NotBuiltReason::NoDocuments));
        }

        info!("Chunking {} documents...", documents.len());
        let mut records = Vec::with_capacity(documents.len());
        let mut chunks: Vec<StoredChunk> = Vec::new();
        for (id, document) in documents.iter().enumerate() {
            let pieces = self.chunking.chunk_content(&document.name, &document.text);
            records.push(DocumentRecord {
                id: id as i64,
                name: document.name.clone(),
                text_hash: *blake3::hash(document.text.as_bytes()).as_bytes(),
                char_count: document.text.chars().count(),
                chunk_count: pieces.len(),
            });
            for piece in pieces {
                chunks.push(StoredChunk {
                    position: chunks.len(),
                    document_id: id as i64,
                    source: piece.source,
                    sequence: piece.sequence,
                    content: piece.chunk_text,
                });
            }
        }

        if chunks.is_empty() {
            warn!("No chunks generated from documents. Index not built.");
            self.clear().await?;
            return Ok(BuildOutcome::NotBuilt(NotBuiltReason::NoChunks));
        }

        info!("Encoding {} chunks...", chunks.len());
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embedded = self
            .embedder
            .embed_texts(&texts)
            .await
            .context("Failed to embed chunks")?;
        ensure!(
            embedded.len() == chunks.len(),
            "Embedding provider returned {} vectors for {} chunks",
            embedded.len(),
            chunks.len()
        );

        let mut index = FlatL2Index::new(embedded.dimension)?;
        index.add_all(&embedded.embeddings)?;

        let metadata = KnowledgeBaseMetadata {
            content_hash: content_hash.to_string(),
            document_count: records.len(),
            chunk_count: chunks.len(),
            dimension: index.dimension(),
            embedding_provider: self.embedder.provider_name().to_string(),
            embedding_model: self.embedder.model_name().to_string(),
            built_at: Utc::now(),
        };
        self.store.replace_all(&records, &chunks, &metadata).await?;
        index.save(&self.index_path).await?;
        info!(
            "Index with {} vectors saved to {}",
            index.len(),
            self.index_path.display()
        );

        Ok(BuildOutcome::Built {
            documents: records.len(),
            chunks: chunks.len(),
            dimension: index.dimension(),
        })
    }

    /// Answer `query` from the `top_k` closest chunks.
    pub async fn ask(&self, query: &str) -> RagResponse {
        self.ask_with_top_k(query, self.top_k).await
    }

    pub async fn ask_with_top_k(&self, query: &str, top_k: usize) -> RagResponse {
        if !self.index_path.exists() {
            return RagResponse::failure(ResponseStatus::NotBuilt);
        }
        let stored = match self.store.chunk_count().await {
            Ok(0) => return RagResponse::failure(ResponseStatus::NotBuilt),
            Ok(n) => n,
            Err(e) => {
                error!("Error loading knowledge base: {e:#}");
                return RagResponse::failure(ResponseStatus::LoadFailed);
            }
        };
        let index = match FlatL2Index::load(&self.index_path).await {
            Ok(index) => index,
            Err(e) => {
                error!("Error loading knowledge base: {e:#}");
                return RagResponse::failure(ResponseStatus::LoadFailed);
            }
        };
        if index.len() != stored {
            error!(
                "Index holds {} vectors but the store holds {} chunks",
                index.len(),
                stored
            );
            return RagResponse::failure(ResponseStatus::LoadFailed);
        }

        let sources = match self.retrieve(&index, query, top_k).await {
            Ok(sources) => sources,
            Err(e) => {
                error!("Error searching knowledge base: {e:#}");
                return RagResponse::failure(ResponseStatus::SearchFailed);
            }
        };

        let context = sources.iter().map(|c| c.content.as_str()).join("\n\n");
        if context.trim().is_empty() {
            return RagResponse::failure(ResponseStatus::NoContext);
        }

        match self.answerer.answer(query, &context).await {
            Ok(answer) => RagResponse {
                answer: answer.text,
                score: answer.score.unwrap_or(0.0),
                context,
                sources,
                status: ResponseStatus::Answered,
            },
            Err(e) => {
                error!("Error during answer generation: {e:#}");
                RagResponse::failure(ResponseStatus::GenerationFailed)
            }
        }
    }

    async fn retrieve(&self, index: &FlatL2Index, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let query_vec = self.embedder.embed_text(query).await?;
        let hits = index.search(&query_vec, top_k)?;
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        debug!("Nearest chunks: {:?}", positions);

        let chunks = self.store.get_chunks(&positions).await?;
        hits.iter()
            .map(|hit| {
                let chunk = chunks
                    .iter()
                    .find(|c| c.position == hit.position)
                    .with_context(|| format!("Chunk {} missing from store", hit.position))?;
                Ok(RetrievedChunk {
                    source: chunk.source.clone(),
                    sequence: chunk.sequence,
                    position: hit.position,
                    distance: hit.distance,
                    content: chunk.content.clone(),
                })
            })
            .collect()
    }
}

/// Hex blake3 digest over document names and texts.
pub fn documents_hash(documents: &[Document]) -> String {
    let mut hasher = blake3::Hasher::new();
    for document in documents {
        hasher.update(document.name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(document.text.len() as u64).to_le_bytes());
        hasher.update(document.text.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

pub async fn create_embedder(config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let settings = &config.embedding;
    match settings.provider {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingProvider::with_dimension(
            settings.hashing_dimension,
        )?)),
        EmbeddingBackend::Fastembed => {
            let embed_config = settings.to_embed_config(config.workspace());
            let provider = FastEmbedProvider::create(embed_config)
                .await
                .context("Failed to load embedding model")?;
            Ok(Arc::new(provider))
        }
    }
}

pub fn create_answerer(
    config: &AppConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn AnswerModel>> {
    let settings = &config.answer;
    match settings.backend {
        AnswerBackend::Extractive => Ok(Arc::new(ExtractiveAnswerer::new(embedder))),
        AnswerBackend::Ollama => Ok(Arc::new(OllamaAnswerer::new(
            &settings.ollama_url,
            &settings.ollama_model,
            Duration::from_secs(settings.timeout_secs),
        )?)),
    }
}
