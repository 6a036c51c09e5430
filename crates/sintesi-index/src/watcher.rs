use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use sintesi_llm::EmbeddingProvider;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::indexer::CodeIndexer;
use crate::languages::is_indexable;

/// Runs an incremental pass whenever an indexable file under the root changes.
pub struct IndexWatcher {
    _handle: tokio::task::JoinHandle<()>,
}

impl IndexWatcher {
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized.
    pub fn start<E: EmbeddingProvider + 'static>(
        root: &Path,
        indexer: Arc<CodeIndexer<E>>,
        debounce: Duration,
    ) -> Result<Self> {
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(1);

        let mut debouncer = new_debouncer(
            debounce,
            move |events: std::result::Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("index watcher error: {e}");
                        return;
                    }
                };

                let relevant = events
                    .iter()
                    .any(|e| e.kind == DebouncedEventKind::Any && is_indexable(&e.path));
                if relevant {
                    // A full channel already has a pass queued.
                    let _ = notify_tx.try_send(());
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)?;

        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            while notify_rx.recv().await.is_some() {
                match indexer.index_project().await {
                    Ok(report) if !report.errors.is_empty() => {
                        tracing::warn!(errors = report.errors.len(), "watch pass finished with errors");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("watch pass failed: {e:#}"),
                }
            }
        });

        Ok(Self { _handle: handle })
    }
}
