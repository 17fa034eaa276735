//! Recursive character text splitting for the question-answering pipeline.
//!
//! Documents are cut into overlapping chunks of bounded length before they are
//! embedded. The splitter tries a list of separators from the most significant
//! (paragraph breaks) to the least significant (single characters):
//!
//! 1. The first separator that occurs in the text is used to split it. The
//!    separator stays attached to the start of the piece that follows it.
//! 2. Pieces shorter than `chunk_size` are collected and merged greedily into
//!    chunks. Consecutive chunks share up to `chunk_overlap` characters.
//! 3. Pieces that are still too long are split again with the remaining
//!    separators.
//!
//! All lengths are measured in characters (Unicode scalar values), not bytes.
//!
//! # Usage
//!
//! ```
//! use docqa_context::splitter::TextSplitter;
//!
//! let splitter = TextSplitter::new(10, 5).unwrap();
//! let chunks = splitter.split_text("aaaa bbbb cccc dddd");
//! assert_eq!(chunks, vec!["aaaa bbbb", "bbbb cccc", "cccc dddd"]);
//!
//! let chunks = splitter.split_document("notes.txt", "aaaa bbbb cccc dddd");
//! assert_eq!(chunks[2].source, "notes.txt");
//! assert_eq!(chunks[2].sequence, 2);
//! ```
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default number of characters shared by consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Default separators, ordered from most to least significant.
///
/// - `\n\n`: paragraph breaks
/// - `\n`: line breaks
/// - ` `: spaces
/// - the empty string: individual characters
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, thiserror::Error)]
pub enum SplitterError {
    #[error("chunk overlap ({overlap}) is larger than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("at least one separator is required")]
    NoSeparators,

    #[error("invalid separator pattern '{pattern}': {source}")]
    InvalidSeparator {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, SplitterError>;

#[derive(Debug, Clone)]
enum Separator {
    Pattern(Regex),
    Characters,
}

impl Separator {
    fn parse(pattern: &str, is_regex: bool) -> Result<Self> {
        if pattern.is_empty() {
            return Ok(Separator::Characters);
        }
        let source = if is_regex {
            pattern.to_string()
        } else {
            regex::escape(pattern)
        };
        Regex::new(&source)
            .map(Separator::Pattern)
            .map_err(|source| SplitterError::InvalidSeparator {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Split `text`, keeping each separator at the start of the following piece.
    /// Empty pieces are dropped.
    fn split_keep<'t>(&self, text: &'t str) -> Vec<&'t str> {
        match self {
            Separator::Characters => text
                .char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect(),
            Separator::Pattern(re) => {
                let mut pieces = Vec::new();
                let mut start = 0;
                for m in re.find_iter(text) {
                    if m.start() == m.end() {
                        continue;
                    }
                    pieces.push(&text[start..m.start()]);
                    start = m.start();
                }
                pieces.push(&text[start..]);
                pieces.retain(|p| !p.is_empty());
                pieces
            }
        }
    }

    fn occurs_in(&self, text: &str) -> bool {
        match self {
            Separator::Characters => true,
            Separator::Pattern(re) => re.find_iter(text).any(|m| m.start() != m.end()),
        }
    }
}

/// A single chunk of a document together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Name of the document the chunk was cut from.
    pub source: String,
    /// Position of this chunk within its document (0-indexed).
    pub sequence: usize,
    /// The chunk text, trimmed of surrounding whitespace.
    pub chunk_text: String,
}

/// Splits text into overlapping chunks using a prioritized list of separators.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Separator>,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS
                .iter()
                .filter_map(|s| Separator::parse(s, false).ok())
                .collect(),
        }
    }
}

impl TextSplitter {
    /// Creates a splitter with the default separators.
    ///
    /// # Errors
    ///
    /// Returns [`SplitterError::OverlapTooLarge`] when `chunk_overlap` exceeds
    /// `chunk_size`, and [`SplitterError::ZeroChunkSize`] for a zero size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::with_separators(chunk_size, chunk_overlap, DEFAULT_SEPARATORS, false)
    }

    /// Creates a splitter with custom separators.
    ///
    /// Separators are literal strings unless `is_regex` is set, in which case
    /// they are compiled as regular expressions. An empty separator means
    /// "split into characters" and ends the list: separators after it are never
    /// reached.
    pub fn with_separators<S: AsRef<str>>(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: &[S],
        is_regex: bool,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(SplitterError::ZeroChunkSize);
        }
        if chunk_overlap > chunk_size {
            return Err(SplitterError::OverlapTooLarge {
                overlap: chunk_overlap,
                size: chunk_size,
            });
        }
        if separators.is_empty() {
            return Err(SplitterError::NoSeparators);
        }
        let separators = separators
            .iter()
            .map(|s| Separator::parse(s.as_ref(), is_regex))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into chunk strings.
    ///
    /// Chunks are trimmed and never empty. A chunk can only exceed
    /// `chunk_size` when a single piece could not be split further.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Splits one document and tags each chunk with its source and sequence.
    pub fn split_document(&self, source: &str, text: &str) -> Vec<TextChunk> {
        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(sequence, chunk_text)| TextChunk {
                source: source.to_string(),
                sequence,
                chunk_text,
            })
            .collect()
    }

    /// Splits every `(source, text)` pair independently and concatenates the
    /// chunks in document order.
    pub fn split_documents<'a, I>(&self, documents: I) -> Vec<TextChunk>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        documents
            .into_iter()
            .flat_map(|(source, text)| self.split_document(source, text))
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[Separator]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let Some(separator) = separator else {
            return Vec::new();
        };

        let mut chunks = Vec::new();
        let mut good_splits: Vec<&str> = Vec::new();

        for piece in separator.split_keep(text) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }
            if !good_splits.is_empty() {
                chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good_splits.is_empty() {
            chunks.extend(self.merge_splits(&good_splits));
        }
        chunks
    }

    // Greedily packs pieces into chunks of at most `chunk_size` characters.
    // After a chunk is emitted, pieces are dropped from the front until what
    // remains fits within the overlap and leaves room for the next piece.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }

        push_joined(&mut docs, &current);
        docs
    }
}

fn pick_separator<'s>(
    text: &str,
    separators: &'s [Separator],
) -> (Option<&'s Separator>, &'s [Separator]) {
    for (i, separator) in separators.iter().enumerate() {
        if let Separator::Characters = separator {
            return (Some(separator), &[]);
        }
        if separator.occurs_in(text) {
            return (Some(separator), &separators[i + 1..]);
        }
    }
    (separators.last(), &[])
}

fn push_joined(docs: &mut Vec<String>, pieces: &VecDeque<(&str, usize)>) {
    let joined: String = pieces.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
