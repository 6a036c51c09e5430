//! Incremental indexing pass: detect → chunk → embed → store → ledger.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use sintesi_llm::EmbeddingProvider;

use crate::batch::batches;
use crate::changes::{
    AnyChangeDetector, DiscoveryConfig, discover_files, fingerprint_bytes, settled_modified_ms,
};
use crate::chunker::{ChunkExtractor, ChunkerConfig};
use crate::context::embedding_text;
use crate::error::{IndexError, Result};
use crate::state::{IndexState, StateStore};
use crate::store::{ChunkStore, StoredChunk, chunk_id};

/// Default number of texts per embedding call.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 20;

/// File updates applied between intermediate ledger writes.
pub const CHECKPOINT_INTERVAL: usize = 16;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Project root; ledger keys are relative to it.
    pub root: PathBuf,
    pub embedding_batch_size: usize,
    /// Files read, chunked and embedded concurrently.
    pub concurrency: usize,
    /// Deadline for a single embedding call.
    pub embed_timeout: Duration,
    /// Try revision-based change detection before comparing fingerprints.
    pub use_git: bool,
    pub discovery: DiscoveryConfig,
    pub chunker: ChunkerConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            concurrency: 4,
            embed_timeout: Duration::from_secs(30),
            use_git: true,
            discovery: DiscoveryConfig::default(),
            chunker: ChunkerConfig::default(),
        }
    }
}

/// Summary of an indexing pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_added: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub files_unchanged: usize,
    pub chunks_created: usize,
    pub chunks_removed: usize,
    pub embedding_calls: usize,
    /// One `"<path>: <cause>"` entry per file that could not be processed.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// A changed file, chunked and embedded, not yet written anywhere.
struct PreparedFile {
    path: String,
    added: bool,
    fingerprint: String,
    modified: Option<u64>,
    chunks: Vec<StoredChunk>,
}

/// Drives incremental indexing of one project into one collection.
///
/// The indexer is the only writer of its [`ChunkStore`] collection and its
/// ledger. Passes are serialized: a second `index_project` call waits for the
/// running one to finish.
pub struct CodeIndexer<E: EmbeddingProvider> {
    store: Arc<ChunkStore>,
    embedder: Arc<E>,
    state_store: Arc<dyn StateStore>,
    detector: AnyChangeDetector,
    extractor: ChunkExtractor,
    config: IndexerConfig,
    pass_lock: tokio::sync::Mutex<()>,
}

impl<E: EmbeddingProvider> CodeIndexer<E> {
    #[must_use]
    pub fn new(
        store: Arc<ChunkStore>,
        embedder: Arc<E>,
        state_store: Arc<dyn StateStore>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            state_store,
            detector: AnyChangeDetector::new(config.use_git),
            extractor: ChunkExtractor::new(config.chunker.clone()),
            config,
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Run one incremental indexing pass over the project root.
    ///
    /// Per-file failures are logged and collected in [`IndexReport::errors`];
    /// the file keeps its previous chunks and is retried on the next pass.
    ///
    /// # Errors
    ///
    /// Returns an error only if discovery cannot run or the final ledger
    /// write fails.
    pub async fn index_project(&self) -> Result<IndexReport> {
        let _pass = self.pass_lock.lock().await;
        let start = Instant::now();
        let mut report = IndexReport::default();
        let mut state = self.state_store.load();

        let root = self.config.root.clone();
        let discovery = self.config.discovery.clone();
        let present =
            tokio::task::spawn_blocking(move || discover_files(&root, &discovery)).await?;
        report.files_scanned = present.len();

        let changes = self.detector.detect(&self.config.root, &state, &present).await;
        report.files_unchanged = present
            .len()
            .saturating_sub(changes.added.len() + changes.modified.len());
        tracing::info!(
            scanned = present.len(),
            added = changes.added.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            "indexing started"
        );

        let mut dirty = false;
        let mut unsaved = 0;

        for path in &changes.deleted {
            if self.remove_deleted(&mut state, path, &mut report).await {
                dirty = true;
                unsaved += 1;
                self.checkpoint_every(&state, &mut unsaved);
            }
        }

        let targets: Vec<(String, PathBuf, bool)> = changes
            .added
            .iter()
            .map(|p| (p, true))
            .chain(changes.modified.iter().map(|p| (p, false)))
            .filter_map(|(p, added)| present.get(p).map(|abs| (p.clone(), abs.clone(), added)))
            .collect();

        let calls = AtomicUsize::new(0);
        let mut update_failed = false;
        let mut prepared = futures::stream::iter(targets)
            .map(|(path, abs, added)| self.prepare_file(path, abs, added, &calls))
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((path, outcome)) = prepared.next().await {
            let result = match outcome {
                Ok(file) => {
                    dirty = true;
                    self.apply_update(&mut state, file, &mut report).await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(true) => unsaved = 0,
                Ok(false) => {
                    unsaved += 1;
                    self.checkpoint_every(&state, &mut unsaved);
                }
                Err(e) => {
                    tracing::warn!(file = %path, error = %e, "indexing file failed");
                    report.errors.push(format!("{path}: {e}"));
                    update_failed = true;
                }
            }
        }
        drop(prepared);
        report.embedding_calls = calls.load(Ordering::Relaxed);

        if !update_failed
            && let Some(revision) = changes.revision
            && state.last_revision.as_deref() != Some(revision.as_str())
        {
            state.last_revision = Some(revision);
            dirty = true;
        }
        if dirty {
            self.state_store.save(&state)?;
        }

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            added = report.files_added,
            modified = report.files_modified,
            deleted = report.files_deleted,
            unchanged = report.files_unchanged,
            chunks_created = report.chunks_created,
            chunks_removed = report.chunks_removed,
            embedding_calls = report.embedding_calls,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "indexing finished"
        );
        Ok(report)
    }

    /// Delete every tracked chunk and clear the ledger.
    ///
    /// Returns the number of chunk ids removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete batch or the ledger write fails. Entries
    /// whose chunks were not deleted stay in the ledger.
    pub async fn reset(&self) -> Result<usize> {
        let _pass = self.pass_lock.lock().await;
        let mut state = self.state_store.load();
        let paths: Vec<String> = state.files.keys().cloned().collect();
        let mut removed = 0;
        for path in paths {
            let ids = state
                .file(&path)
                .map(|f| f.chunk_ids.clone())
                .unwrap_or_default();
            if let Err(e) = self.store.delete_chunks(&ids).await {
                self.checkpoint(&state);
                return Err(e);
            }
            removed += ids.len();
            state.remove_file(&path);
        }
        state.last_revision = None;
        self.state_store.save(&state)?;
        tracing::info!(chunks = removed, "index reset");
        Ok(removed)
    }

    /// Remove the chunks of a file that no longer exists. Returns whether the
    /// ledger changed.
    async fn remove_deleted(
        &self,
        state: &mut IndexState,
        path: &str,
        report: &mut IndexReport,
    ) -> bool {
        let Some(entry) = state.file(path).cloned() else {
            return false;
        };
        let outcome = self.store.delete_in_batches(&entry.chunk_ids).await;
        report.chunks_removed += outcome.deleted;
        match outcome.error {
            None => {
                state.remove_file(path);
                report.files_deleted += 1;
                tracing::debug!(file = %path, chunks = outcome.deleted, "removed deleted file");
            }
            Some(e) => {
                if outcome.deleted == 0 {
                    tracing::warn!(file = %path, error = %e, "removing deleted file failed");
                    report.errors.push(format!("{path}: {e}"));
                    return false;
                }
                state.set_file_state(
                    path,
                    entry.fingerprint,
                    entry.chunk_ids[outcome.deleted..].to_vec(),
                    entry.modified,
                );
                tracing::warn!(file = %path, error = %e, "removing deleted file failed");
                report.errors.push(format!("{path}: {e}"));
            }
        }
        true
    }

    async fn prepare_file(
        &self,
        path: String,
        abs: PathBuf,
        added: bool,
        calls: &AtomicUsize,
    ) -> (String, Result<PreparedFile>) {
        let result = async {
            let modified = tokio::fs::metadata(&abs)
                .await
                .ok()
                .and_then(|m| settled_modified_ms(&m));
            let bytes = tokio::fs::read(&abs).await?;
            let fingerprint = fingerprint_bytes(&bytes);
            let content = String::from_utf8_lossy(&bytes);

            let chunks = self.extractor.extract(&path, &content);
            let texts: Vec<String> = chunks.iter().map(|c| embedding_text(&path, c)).collect();
            let vectors = embed_in_batches(
                self.embedder.as_ref(),
                &texts,
                self.config.embedding_batch_size,
                self.config.embed_timeout,
                calls,
            )
            .await?;

            let chunks = chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| StoredChunk {
                    id: chunk_id(&path, chunk.start_line, chunk.end_line, &chunk.content),
                    content: chunk.content,
                    file_path: Some(path.clone()),
                    start_line: Some(chunk.start_line),
                    end_line: Some(chunk.end_line),
                    label: chunk.label,
                    vector,
                })
                .collect();

            Ok(PreparedFile {
                path: path.clone(),
                added,
                fingerprint,
                modified,
                chunks,
            })
        }
        .await;
        (path, result)
    }

    /// Swap a file's chunks for freshly embedded ones.
    ///
    /// New chunks are written before stale ones are deleted, and the ledger
    /// tracks the union in between, so no id in the ledger ever points at a
    /// deleted vector. Returns whether the ledger was written; updates that
    /// delete nothing are left to [`CHECKPOINT_INTERVAL`] batching.
    async fn apply_update(
        &self,
        state: &mut IndexState,
        file: PreparedFile,
        report: &mut IndexReport,
    ) -> Result<bool> {
        let PreparedFile {
            path,
            added,
            fingerprint,
            modified,
            chunks,
        } = file;

        let old_ids: Vec<String> = state
            .file(&path)
            .map(|f| f.chunk_ids.clone())
            .unwrap_or_default();
        let new_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let new_set: HashSet<&str> = new_ids.iter().map(String::as_str).collect();
        let stale: Vec<String> = old_ids
            .iter()
            .filter(|id| !new_set.contains(id.as_str()))
            .cloned()
            .collect();

        let created = chunks.len();
        self.store.add_chunks(chunks).await?;

        if !stale.is_empty() {
            let mut union = new_ids.clone();
            union.extend(stale.iter().cloned());
            state.set_file_state(&path, fingerprint.clone(), union, modified);
            self.checkpoint(state);
        }

        let outcome = self.store.delete_in_batches(&stale).await;
        report.chunks_removed += outcome.deleted;
        report.chunks_created += created;
        if added {
            report.files_added += 1;
        } else {
            report.files_modified += 1;
        }

        match outcome.error {
            None => {
                state.set_file_state(&path, fingerprint, new_ids, modified);
                let saved = !stale.is_empty();
                if saved {
                    self.checkpoint(state);
                }
                tracing::debug!(file = %path, chunks = created, stale = stale.len(), "indexed file");
                Ok(saved)
            }
            Some(e) => {
                // Leftover ids stay tracked; an empty fingerprint forces the
                // file through the next pass so they get another delete.
                let mut kept = new_ids;
                kept.extend(stale[outcome.deleted..].iter().cloned());
                state.set_file_state(&path, String::new(), kept, None);
                self.checkpoint(state);
                Err(e)
            }
        }
    }

    /// Best-effort intermediate ledger write; the end of the pass writes again.
    fn checkpoint(&self, state: &IndexState) {
        if let Err(e) = self.state_store.save(state) {
            tracing::warn!(error = %e, "index state checkpoint failed");
        }
    }

    fn checkpoint_every(&self, state: &IndexState, unsaved: &mut usize) {
        if *unsaved >= CHECKPOINT_INTERVAL {
            self.checkpoint(state);
            *unsaved = 0;
        }
    }
}

/// Embed `texts` in order, at most `batch_size` per call.
///
/// Each call gets `timeout`; `calls` is incremented once per call issued.
pub(crate) async fn embed_in_batches<E: EmbeddingProvider + ?Sized>(
    embedder: &E,
    texts: &[String],
    batch_size: usize,
    timeout: Duration,
    calls: &AtomicUsize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in batches(texts, batch_size) {
        calls.fetch_add(1, Ordering::Relaxed);
        let embedded = tokio::time::timeout(timeout, embedder.embed_batch(batch))
            .await
            .map_err(|_| IndexError::Timeout {
                operation: "embedding",
                secs: timeout.as_secs(),
            })??;
        if embedded.len() != batch.len() {
            return Err(IndexError::EmbeddingCount {
                expected: batch.len(),
                actual: embedded.len(),
            });
        }
        vectors.extend(embedded);
    }
    Ok(vectors)
}
