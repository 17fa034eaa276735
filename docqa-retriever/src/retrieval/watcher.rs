use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use super::chunking_strategy::ChunkingStrategy;

/// Debounced change notifications for the documents directory.
///
/// The notify callback runs on its own thread and forwards batches of
/// relevant paths into a flume channel, which async code drains with
/// [`next_change`](Self::next_change).
pub struct DocumentWatcher {
    dir: PathBuf,
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    events_rx: flume::Receiver<Vec<PathBuf>>,
}

impl DocumentWatcher {
    pub fn new(dir: &Path, debounce: Duration) -> Result<Self> {
        let (events_tx, events_rx) = flume::unbounded();

        let mut debouncer = notify_debouncer_mini::new_debouncer(
            debounce,
            move |res: notify_debouncer_mini::DebounceEventResult| match res {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events
                        .into_iter()
                        .map(|ev| ev.path)
                        .filter(|path| is_relevant(path))
                        .collect();
                    if !paths.is_empty() {
                        // The receiver is gone once the session shuts down
                        let _ = events_tx.send(paths);
                    }
                }
                Err(e) => tracing::warn!("File watcher error: {e:?}"),
            },
        )?;

        debouncer
            .watcher()
            .watch(dir, notify::RecursiveMode::NonRecursive)?;
        tracing::debug!("Watching {} for changes", dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            _debouncer: debouncer,
            events_rx,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait for the next batch of changed paths.
    pub async fn next_change(&self) -> Option<Vec<PathBuf>> {
        self.events_rx.recv_async().await.ok()
    }

    /// Collect everything that is already queued without waiting.
    pub fn drain(&self) -> Vec<PathBuf> {
        self.events_rx.try_iter().flatten().collect()
    }
}

/// Deleted files count too, so only the name is checked.
fn is_relevant(path: &Path) -> bool {
    ChunkingStrategy::should_index_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::time::timeout;
    use tracing_test::traced_test;

    #[test]
    fn test_relevance_filter() {
        assert!(is_relevant(Path::new("/docs/news.txt")));
        assert!(is_relevant(Path::new("/docs/gone.pdf")));
        assert!(!is_relevant(Path::new("/docs/.news.txt.swp")));
        assert!(!is_relevant(Path::new("/docs/image.png")));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_reports_new_document() -> Result<()> {
        let dir = tempdir()?;
        let watcher = DocumentWatcher::new(dir.path(), Duration::from_millis(100))?;
        assert_eq!(watcher.dir(), dir.path());

        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(dir.path().join("fresh.txt"), "hello")?;
        std::fs::write(dir.path().join("ignored.png"), [0u8; 4])?;

        let changed = timeout(Duration::from_secs(10), watcher.next_change())
            .await?
            .unwrap_or_default();
        assert!(changed.iter().any(|p| p.ends_with("fresh.txt")));
        assert!(changed.iter().all(|p| !p.ends_with("ignored.png")));
        Ok(())
    }
}
