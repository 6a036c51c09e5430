#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sintesi_index::{
    ChunkStore, CodeIndexer, CodeRetriever, IndexerConfig, MemoryStateStore, RerankStrategy,
    RetrievalConfig,
};
use sintesi_llm::mock::MockEmbedder;
use sintesi_store::{
    BoxFuture, InMemoryVectorStore, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError,
};
use tempfile::TempDir;

pub const COLLECTION: &str = "chunks";

/// In-memory store that records every mutation and search request.
pub struct RecordingStore {
    pub inner: InMemoryVectorStore,
    upserts: AtomicUsize,
    delete_batches: Mutex<Vec<usize>>,
    search_limits: Mutex<Vec<u64>>,
    fail_deletes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryVectorStore::new(),
            upserts: AtomicUsize::new(0),
            delete_batches: Mutex::new(Vec::new()),
            search_limits: Mutex::new(Vec::new()),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn delete_batches(&self) -> Vec<usize> {
        self.delete_batches.lock().unwrap().clone()
    }

    pub fn search_limits(&self) -> Vec<u64> {
        self.search_limits.lock().unwrap().clone()
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn reset_counters(&self) {
        self.upserts.store(0, Ordering::SeqCst);
        self.delete_batches.lock().unwrap().clear();
        self.search_limits.lock().unwrap().clear();
    }

    pub fn mutations(&self) -> usize {
        self.upserts() + self.delete_batches().len()
    }

    pub fn point_count(&self) -> usize {
        self.inner.point_count(COLLECTION).unwrap_or(0)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains(COLLECTION, id)
    }
}

impl VectorStore for RecordingStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        self.inner.ensure_collection(collection, vector_size)
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        self.inner.delete_collection(collection)
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(collection, points)
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        self.search_limits.lock().unwrap().push(limit);
        self.inner.search(collection, vector, limit)
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        self.delete_batches.lock().unwrap().push(ids.len());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Box::pin(async { Err(VectorStoreError::Delete("injected failure".into())) });
        }
        self.inner.delete_by_ids(collection, ids)
    }
}

/// A temp project wired to a recording store, a mock embedder and an
/// in-memory ledger.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<RecordingStore>,
    pub chunks: Arc<ChunkStore>,
    pub embedder: MockEmbedder,
    pub state: Arc<MemoryStateStore>,
    pub indexer: CodeIndexer<MockEmbedder>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_embedder(MockEmbedder::new(1024))
    }

    pub fn with_embedder(embedder: MockEmbedder) -> Self {
        Self::build(embedder, false)
    }

    /// A harness whose root is a fresh git repository, or `None` when git
    /// is not available.
    pub fn with_git() -> Option<Self> {
        let h = Self::build(MockEmbedder::new(1024), true);
        h.git(&["init", "-q"]).then_some(h)
    }

    fn build(embedder: MockEmbedder, use_git: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordingStore::new());
        let chunks = Arc::new(ChunkStore::new(store.clone(), COLLECTION));
        let state = Arc::new(MemoryStateStore::default());
        let indexer = CodeIndexer::new(
            chunks.clone(),
            Arc::new(embedder.clone()),
            state.clone(),
            IndexerConfig {
                root: dir.path().to_path_buf(),
                use_git,
                ..IndexerConfig::default()
            },
        );
        Self {
            dir,
            store,
            chunks,
            embedder,
            state,
            indexer,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self, args: &[&str]) -> bool {
        Command::new("git")
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(self.root())
            .output()
            .is_ok_and(|o| o.status.success())
    }

    pub fn commit_all(&self, message: &str) -> bool {
        self.git(&["add", "-A"]) && self.git(&["commit", "-q", "-m", message])
    }

    pub fn head(&self) -> String {
        let out = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(self.root())
            .output()
            .unwrap();
        String::from_utf8(out.stdout).unwrap().trim().to_owned()
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.root().join(rel)).unwrap();
    }

    pub fn chunk_ids(&self, rel: &str) -> Vec<String> {
        self.state
            .snapshot()
            .file(rel)
            .map(|f| f.chunk_ids.clone())
            .unwrap_or_default()
    }

    pub fn retriever(&self, reranker: RerankStrategy) -> CodeRetriever<MockEmbedder> {
        CodeRetriever::new(
            self.chunks.clone(),
            Arc::new(self.embedder.clone()),
            reranker,
            RetrievalConfig::default(),
        )
    }

    pub fn reset_counters(&self) {
        self.store.reset_counters();
        self.embedder.reset_calls();
    }
}

/// Markdown with `n` single-line paragraphs, one chunk each.
pub fn paragraphs(n: usize, tag: &str) -> String {
    (0..n)
        .map(|i| format!("{tag} paragraph number {i}."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A TypeScript class spanning exactly 400 lines with `132` three-line methods.
pub fn large_class() -> String {
    let mut lines = vec!["export class Widget {".to_owned(), String::new()];
    for i in 0..132 {
        lines.push(format!("  method{i}() {{"));
        lines.push(format!("    return {i};"));
        lines.push("  }".to_owned());
    }
    lines.push(String::new());
    lines.push("}".to_owned());
    assert_eq!(lines.len(), 400);
    lines.join("\n") + "\n"
}
