//! docqa-retriever: document question answering over a local folder
//!
//! Documents (`.txt`, `.pdf`, `.csv`) are extracted, split into overlapping
//! chunks, embedded and stored in an exhaustive L2 index. Questions are
//! answered from the closest chunks by a pluggable answer model.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: extraction, chunking, the knowledge base pipeline,
//!   answer models and the directory watcher
//! - **[`storage`]**: the flat vector index and the SQLite chunk store
//! - **[`session`]**: the interactive shell state machine
//! - **[`config`]**: `docqa.toml` loading
//! - **[`status`]**: knowledge-base diagnostics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docqa_retriever::{config::AppConfig, session::Session};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::default().with_workspace("./qa");
//! let mut session = Session::from_config(&config).await?;
//! session.startup(true).await?;
//!
//! let outcome = session.ask("What do AI tools interpret?").await?;
//! if let Some(response) = outcome.response() {
//!     println!("{} ({:.2})", response.answer, response.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! documents/ → extract → TextSplitter → EmbeddingProvider → FlatL2Index + SQLite
//!     ↑                                                          ↓
//! DocumentWatcher → Session ─────── ask ──→ top-k chunks → AnswerModel
//! ```

pub mod config;
pub mod retrieval;
pub mod session;
pub mod status;
pub mod storage;
