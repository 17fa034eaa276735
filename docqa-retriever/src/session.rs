//! Session shell around the knowledge base.
//!
//! Every interaction re-evaluates the state of the documents directory, the
//! way a form-based UI does on each rerun: the session remembers whether an
//! index is built, how many documents it covers and the hash of the directory
//! snapshot it was built from, and rebuilds when that hash goes stale.

use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::retrieval::knowledge_base::{KnowledgeBase, RagResponse};
use crate::retrieval::scanner::{
    DocumentSnapshot, clear_documents_dir, ensure_documents_dir, scan_documents_async,
    seed_demo_document, write_documents,
};

pub const EMPTY_QUESTION_MESSAGE: &str = "Please enter a question.";
pub const NOT_READY_MESSAGE: &str =
    "Upload documents and rebuild the knowledge base to enable Q&A.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub index_built: bool,
    pub document_count: usize,
    /// Snapshot hash of the documents the current index was built from
    pub current_documents_hash: Option<String>,
}

/// A file handed to [`Session::upload`].
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, bytes })
    }
}

#[derive(Debug)]
pub enum AskOutcome {
    EmptyQuestion,
    NotReady,
    Response(RagResponse),
}

impl AskOutcome {
    pub fn response(&self) -> Option<&RagResponse> {
        match self {
            Self::Response(response) => Some(response),
            _ => None,
        }
    }
}

pub struct Session {
    kb: KnowledgeBase,
    documents_dir: PathBuf,
    state: SessionState,
}

impl Session {
    pub fn new(kb: KnowledgeBase, documents_dir: impl Into<PathBuf>) -> Self {
        Self {
            kb,
            documents_dir: documents_dir.into(),
            state: SessionState::default(),
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let kb = KnowledgeBase::from_config(config).await?;
        Ok(Self::new(kb, config.documents_dir()))
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    /// Prepare the documents directory and build from what is on disk.
    pub async fn startup(&mut self, seed_demo: bool) -> Result<&SessionState> {
        ensure_documents_dir(&self.documents_dir)?;
        if seed_demo {
            seed_demo_document(&self.documents_dir)?;
        }
        self.initial_build().await
    }

    pub async fn initial_build(&mut self) -> Result<&SessionState> {
        info!("Performing initial/startup index check.");
        let snapshot = self.scan().await?;
        if snapshot.is_empty() {
            self.state.index_built = false;
            self.state.document_count = 0;
            info!("No documents found on disk for initial index build. Please upload files.");
            return Ok(&self.state);
        }

        self.rebuild(&snapshot).await?;
        if self.state.index_built {
            info!(
                "Initial knowledge base built with {} documents from disk.",
                self.state.document_count
            );
        } else {
            error!("Failed to build initial knowledge base from existing documents.");
        }
        Ok(&self.state)
    }

    /// Take over the state of a knowledge base built by an earlier process.
    pub async fn resume(&mut self) -> Result<&SessionState> {
        if self.kb.is_built().await {
            if let Some(metadata) = self.kb.store().metadata().await? {
                self.state = SessionState {
                    index_built: true,
                    document_count: metadata.document_count,
                    current_documents_hash: Some(metadata.content_hash),
                };
            }
        }
        Ok(&self.state)
    }

    /// Replace every document with `files` and rebuild.
    pub async fn upload(&mut self, files: Vec<UploadedFile>) -> Result<&SessionState> {
        let removed = clear_documents_dir(&self.documents_dir)?;
        info!(
            "Cleared {} existing documents from '{}'.",
            removed,
            self.documents_dir.display()
        );

        for file in files {
            let entry = [(file.name.clone(), file.bytes)];
            match write_documents(&self.documents_dir, &entry) {
                Ok(_) => info!("Saved {}", file.name),
                Err(e) => error!("Error saving {}: {e:#}", file.name),
            }
        }

        let snapshot = self.scan().await?;
        self.rebuild(&snapshot).await?;
        if self.state.index_built {
            info!(
                "Knowledge base rebuilt successfully with {} documents!",
                self.state.document_count
            );
        } else {
            error!("Failed to rebuild knowledge base. Check logs for errors during file processing or indexing.");
        }
        Ok(&self.state)
    }

    /// Rebuild when no index is built and the directory changed since the
    /// last successful build. Returns whether a build was attempted.
    pub async fn refresh(&mut self) -> Result<bool> {
        if self.state.index_built {
            return Ok(false);
        }
        let snapshot = self.scan().await?;
        if snapshot.is_empty() || self.is_current(&snapshot) {
            return Ok(false);
        }
        self.rebuild(&snapshot).await?;
        if !self.state.index_built {
            warn!("No documents or failed to build from existing files on disk.");
        }
        Ok(true)
    }

    /// Rebuild whenever the directory differs from the indexed snapshot,
    /// including when every document was removed.
    pub async fn sync_with_disk(&mut self) -> Result<bool> {
        let snapshot = self.scan().await?;
        if self.is_current(&snapshot) {
            return Ok(false);
        }
        info!("Documents changed on disk, rebuilding knowledge base");
        self.rebuild_snapshot(snapshot).await?;
        Ok(true)
    }

    /// Rebuild from the directory unconditionally. An empty directory clears
    /// the knowledge base.
    pub async fn rebuild_from_disk(&mut self) -> Result<&SessionState> {
        let snapshot = self.scan().await?;
        self.rebuild_snapshot(snapshot).await?;
        Ok(&self.state)
    }

    async fn rebuild_snapshot(&mut self, snapshot: DocumentSnapshot) -> Result<()> {
        self.rebuild(&snapshot).await?;
        if snapshot.is_empty() {
            self.state.current_documents_hash = Some(snapshot.content_hash);
        }
        Ok(())
    }

    pub async fn ask(&mut self, question: &str) -> Result<AskOutcome> {
        if question.trim().is_empty() {
            return Ok(AskOutcome::EmptyQuestion);
        }
        self.refresh().await?;
        if !self.state.index_built {
            return Ok(AskOutcome::NotReady);
        }
        Ok(AskOutcome::Response(self.kb.ask(question).await))
    }

    pub fn status_line(&self) -> String {
        if self.state.index_built {
            format!(
                "Knowledge base is ready with {} documents. Ask away!",
                self.state.document_count
            )
        } else {
            NOT_READY_MESSAGE.to_string()
        }
    }

    async fn scan(&self) -> Result<DocumentSnapshot> {
        scan_documents_async(self.documents_dir.clone()).await
    }

    fn is_current(&self, snapshot: &DocumentSnapshot) -> bool {
        self.state.current_documents_hash.as_deref() == Some(snapshot.content_hash.as_str())
    }

    async fn rebuild(&mut self, snapshot: &DocumentSnapshot) -> Result<()> {
        match self.kb.build_from_snapshot(snapshot).await {
            Ok(outcome) if outcome.is_built() => {
                self.state = SessionState {
                    index_built: true,
                    document_count: snapshot.documents.len(),
                    current_documents_hash: Some(snapshot.content_hash.clone()),
                };
                Ok(())
            }
            Ok(outcome) => {
                info!("Knowledge base not built: {outcome:?}");
                self.state.index_built = false;
                self.state.document_count = 0;
                Ok(())
            }
            Err(e) => {
                self.state.index_built = false;
                self.state.document_count = 0;
                Err(e)
            }
        }
    }
}

/// Plain-text rendering of an answer: the answer, the retrieved context when
/// there is one, and the confidence score.
pub fn format_response(response: &RagResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Answer:\n{}", response.answer);
    if !response.context.is_empty() {
        let _ = writeln!(out, "\nRetrieved Context:\n{}", response.context);
    }
    let _ = write!(out, "\nConfidence Score: {:.2}", response.score);
    out
}

pub fn format_outcome(outcome: &AskOutcome) -> String {
    match outcome {
        AskOutcome::EmptyQuestion => EMPTY_QUESTION_MESSAGE.to_string(),
        AskOutcome::NotReady => NOT_READY_MESSAGE.to_string(),
        AskOutcome::Response(response) => format_response(response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::knowledge_base::{NOT_BUILT_MESSAGE, ResponseStatus};

    #[test]
    fn test_format_response() {
        let response = RagResponse {
            answer: "Paris.".to_string(),
            score: 0.876,
            context: "Paris is the capital of France.".to_string(),
            sources: Vec::new(),
            status: ResponseStatus::Answered,
        };
        assert_eq!(
            format_response(&response),
            "Answer:\nParis.\n\nRetrieved Context:\nParis is the capital of France.\n\nConfidence Score: 0.88"
        );
    }

    #[test]
    fn test_format_failure_omits_context() {
        let response = RagResponse {
            answer: NOT_BUILT_MESSAGE.to_string(),
            score: 0.0,
            context: String::new(),
            sources: Vec::new(),
            status: ResponseStatus::NotBuilt,
        };
        let text = format_response(&response);
        assert!(!text.contains("Retrieved Context"));
        assert!(text.ends_with("Confidence Score: 0.00"));
        assert_eq!(
            format_outcome(&AskOutcome::EmptyQuestion),
            "Please enter a question."
        );
    }
}
