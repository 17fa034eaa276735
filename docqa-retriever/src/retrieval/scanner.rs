//! Reading the documents directory.
//!
//! The directory is flat: every regular file directly inside it counts,
//! dotfiles included. A snapshot carries the extracted texts plus a blake3 hash
//! over the names and raw bytes of every file, which is how the session notices
//! that the directory changed.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::extract::process_file_content;

/// File name of the sample document written on first start.
pub const DEMO_DOCUMENT_NAME: &str = "news.txt";

pub const DEMO_NEWS: &str = "Artificial Intelligence (AI) is transforming the healthcare industry by enhancing diagnostics, personalizing treatment plans, and improving patient outcomes. \
AI models can analyze vast amounts of medical data to detect patterns that are not easily visible to human doctors. \
In recent years, AI-powered tools have been deployed to interpret medical imaging such as X-rays and MRIs. \
These tools can often match or exceed the accuracy of radiologists in identifying anomalies like tumors or fractures. \
Moreover, AI is being used to assist in drug discovery by predicting molecular behavior and accelerating research timelines. \
Personalized medicine is another growing area, where AI analyzes patient genetics and lifestyle to suggest the most effective treatments. \
Despite the potential, challenges remain in data privacy, bias in training data, and the need for regulatory oversight. \
Nevertheless, the integration of AI into healthcare continues to grow rapidly, offering promising advancements in patient care.";

/// A document whose text was extracted successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub name: String,
    pub text: String,
}

impl Document {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Everything read from the documents directory in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSnapshot {
    /// Documents with non-empty text, ordered by file name
    pub documents: Vec<Document>,
    /// Hex blake3 digest over every file's name and raw bytes
    pub content_hash: String,
    /// Number of regular files seen, including skipped ones
    pub files_seen: usize,
}

impl DocumentSnapshot {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub fn ensure_documents_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        tracing::info!("Created '{}' directory.", dir.display());
    }
    Ok(())
}

/// Write the sample document unless a file with its name already exists.
///
/// Returns whether the file was written.
pub fn seed_demo_document(dir: &Path) -> Result<bool> {
    ensure_documents_dir(dir)?;
    let path = dir.join(DEMO_DOCUMENT_NAME);
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(&path, DEMO_NEWS)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Created demo file: {}", path.display());
    Ok(true)
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_document_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .hidden(false)
        .max_depth(Some(1))
        .build();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        if entry.depth() == 1 && entry.file_type().is_some_and(|t| t.is_file()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Read and extract every document in `dir`.
///
/// Files that cannot be read are logged and left out of both the documents
/// and the hash. A missing directory is an empty snapshot.
pub fn scan_documents(dir: &Path) -> Result<DocumentSnapshot> {
    let mut hasher = blake3::Hasher::new();
    let mut documents = Vec::new();
    let mut files_seen = 0;

    for path in list_document_files(dir)? {
        let name = file_name(&path);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Could not read file {} from disk: {}", name, e);
                continue;
            }
        };
        files_seen += 1;

        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);

        match process_file_content(&name, &bytes) {
            Some(text) if !text.is_empty() => documents.push(Document { name, text }),
            Some(_) => tracing::debug!("{} contains no text", name),
            None => {}
        }
    }

    tracing::debug!(
        "Scanned {}: {} files, {} documents",
        dir.display(),
        files_seen,
        documents.len()
    );

    Ok(DocumentSnapshot {
        documents,
        content_hash: hasher.finalize().to_hex().to_string(),
        files_seen,
    })
}

/// [`scan_documents`] on a blocking thread; PDF extraction is CPU bound.
pub async fn scan_documents_async(dir: PathBuf) -> Result<DocumentSnapshot> {
    tokio::task::spawn_blocking(move || scan_documents(&dir)).await?
}

/// Remove every regular file in `dir`. Returns how many were deleted.
pub fn clear_documents_dir(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Store uploaded files in `dir` under their base names.
///
/// Returns the written paths in upload order.
pub fn write_documents(dir: &Path, files: &[(String, Vec<u8>)]) -> Result<Vec<PathBuf>> {
    ensure_documents_dir(dir)?;
    let mut written = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        let base = Path::new(name)
            .file_name()
            .with_context(|| format!("Invalid upload name: {name:?}"))?;
        let path = dir.join(base);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_seed_demo_document_once() {
        let dir = tempdir().unwrap();
        let docs = dir.path().join("documents");

        assert!(seed_demo_document(&docs).unwrap());
        assert_eq!(
            std::fs::read_to_string(docs.join(DEMO_DOCUMENT_NAME)).unwrap(),
            DEMO_NEWS
        );

        std::fs::write(docs.join(DEMO_DOCUMENT_NAME), "edited").unwrap();
        assert!(!seed_demo_document(&docs).unwrap());
        assert_eq!(
            std::fs::read_to_string(docs.join(DEMO_DOCUMENT_NAME)).unwrap(),
            "edited"
        );
    }

    #[test]
    fn test_scan_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        std::fs::write(dir.path().join("a.csv"), "x,y\n1,2\n").unwrap();
        std::fs::write(dir.path().join("empty.txt"), "").unwrap();
        std::fs::write(dir.path().join("photo.jpg"), [0xff, 0xd8]).unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), "secret").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.txt"), "deep").unwrap();

        let snapshot = scan_documents(dir.path()).unwrap();
        assert_eq!(
            snapshot.documents,
            vec![
                Document::new(".hidden.txt", "secret"),
                Document::new("a.csv", "x, y\n1, 2"),
                Document::new("b.txt", "second"),
            ]
        );
        assert_eq!(snapshot.files_seen, 5);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_hash_tracks_content_and_names() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one").unwrap();
        let first = scan_documents(dir.path()).unwrap().content_hash;
        assert_eq!(scan_documents(dir.path()).unwrap().content_hash, first);

        std::fs::write(dir.path().join("a.txt"), "two").unwrap();
        let second = scan_documents(dir.path()).unwrap().content_hash;
        assert_ne!(first, second);

        std::fs::rename(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();
        assert_ne!(scan_documents(dir.path()).unwrap().content_hash, second);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let snapshot = scan_documents(&dir.path().join("absent")).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.files_seen, 0);
    }

    #[tokio::test]
    async fn test_clear_and_write_documents() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), "old").unwrap();
        std::fs::write(dir.path().join("older.pdf"), "old").unwrap();

        assert_eq!(clear_documents_dir(dir.path()).unwrap(), 2);
        let written = write_documents(
            dir.path(),
            &[("../escape/new.txt".to_string(), b"fresh".to_vec())],
        )
        .unwrap();
        assert_eq!(written, vec![dir.path().join("new.txt")]);

        let snapshot = scan_documents_async(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(snapshot.documents, vec![Document::new("new.txt", "fresh")]);
    }
}
