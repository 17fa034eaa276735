pub mod splitter;

// Re-export the splitter for external use
pub use splitter::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_SEPARATORS, SplitterError, TextChunk,
    TextSplitter,
};
