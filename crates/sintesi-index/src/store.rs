//! Chunk-level view over a [`VectorStore`] collection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sintesi_store::{ScoredVectorPoint, VectorPoint, VectorStore};
use uuid::Uuid;

use crate::batch::batches;
use crate::error::{IndexError, Result};

/// Default upper bound on ids per delete call.
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 50;

const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x1d, 0x3e, 0x52, 0x8a, 0x0b, 0x4c, 0x47, 0x9e, 0x21, 0x5b, 0x7c, 0xd4, 0x10, 0xa3, 0x88,
]);

/// A chunk ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub content: String,
    pub file_path: Option<String>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub label: String,
    pub vector: Vec<f32>,
}

/// A similarity hit decoded from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub id: String,
    pub content: String,
    pub file_path: Option<String>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub label: String,
    pub score: f32,
}

impl SearchCandidate {
    fn from_scored_point(point: ScoredVectorPoint) -> Self {
        let str_field = |key: &str| {
            point
                .payload
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };
        let line_field = |key: &str| {
            point
                .payload
                .get(key)
                .and_then(serde_json::Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
        };
        Self {
            content: str_field("content").unwrap_or_default(),
            file_path: str_field("file_path"),
            start_line: line_field("start_line"),
            end_line: line_field("end_line"),
            label: str_field("label").unwrap_or_default(),
            id: point.id,
            score: point.score,
        }
    }
}

/// Stable id for a chunk: UUIDv5 over its location and content hash.
///
/// Re-indexing identical content at the same location maps onto the same
/// point, so an interrupted upsert is overwritten rather than duplicated.
#[must_use]
pub fn chunk_id(file_path: &str, start_line: usize, end_line: usize, content: &str) -> String {
    let hash = blake3::hash(content.as_bytes()).to_hex();
    let key = format!("{file_path}:{start_line}:{end_line}:{hash}");
    Uuid::new_v5(&CHUNK_ID_NAMESPACE, key.as_bytes()).to_string()
}

/// Progress of a batched delete.
#[derive(Debug)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub error: Option<IndexError>,
}

/// Chunk persistence on one collection, with batched deletes.
pub struct ChunkStore {
    store: Arc<dyn VectorStore>,
    collection: String,
    delete_batch_size: usize,
    collection_ready: AtomicBool,
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("collection", &self.collection)
            .field("delete_batch_size", &self.delete_batch_size)
            .finish_non_exhaustive()
    }
}

impl ChunkStore {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            collection_ready: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Upsert `chunks`, creating the collection on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be created or the upsert fails.
    pub async fn add_chunks(&self, chunks: Vec<StoredChunk>) -> Result<()> {
        let Some(first) = chunks.first() else {
            return Ok(());
        };
        if !self.collection_ready.load(Ordering::Acquire) {
            self.store
                .ensure_collection(&self.collection, first.vector.len() as u64)
                .await?;
            self.collection_ready.store(true, Ordering::Release);
        }
        let points = chunks.into_iter().map(to_point).collect();
        self.store.upsert(&self.collection, points).await?;
        Ok(())
    }

    /// Delete `ids` in groups of at most `delete_batch_size`.
    ///
    /// Stops at the first failing group; earlier groups stay deleted.
    ///
    /// # Errors
    ///
    /// Returns the store error of the failing group.
    pub async fn delete_chunks(&self, ids: &[String]) -> Result<()> {
        match self.delete_in_batches(ids).await.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Batched delete that reports how far it got.
    ///
    /// `ids[..outcome.deleted]` are gone from the store; the rest were not
    /// attempted or belong to the failing group.
    pub async fn delete_in_batches(&self, ids: &[String]) -> DeleteOutcome {
        let mut deleted = 0;
        for group in batches(ids, self.delete_batch_size) {
            if let Err(e) = self
                .store
                .delete_by_ids(&self.collection, group.to_vec())
                .await
            {
                return DeleteOutcome {
                    deleted,
                    error: Some(e.into()),
                };
            }
            deleted += group.len();
        }
        DeleteOutcome {
            deleted,
            error: None,
        }
    }

    /// Up to `k` nearest chunks to `vector`.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails (including a missing collection).
    pub async fn search(&self, vector: Vec<f32>, k: usize) -> Result<Vec<SearchCandidate>> {
        let hits = self
            .store
            .search(&self.collection, vector, k as u64)
            .await?;
        Ok(hits
            .into_iter()
            .map(SearchCandidate::from_scored_point)
            .collect())
    }

    /// Drop the whole collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the request.
    pub async fn clear(&self) -> Result<()> {
        self.store.delete_collection(&self.collection).await?;
        self.collection_ready.store(false, Ordering::Release);
        Ok(())
    }
}

fn to_point(chunk: StoredChunk) -> VectorPoint {
    let mut payload = HashMap::from([
        ("content".to_owned(), serde_json::json!(chunk.content)),
        ("label".to_owned(), serde_json::json!(chunk.label)),
    ]);
    if let Some(path) = chunk.file_path {
        payload.insert("file_path".into(), serde_json::json!(path));
    }
    if let Some(start) = chunk.start_line {
        payload.insert("start_line".into(), serde_json::json!(start));
    }
    if let Some(end) = chunk.end_line {
        payload.insert("end_line".into(), serde_json::json!(end));
    }
    VectorPoint {
        id: chunk.id,
        vector: chunk.vector,
        payload,
    }
}
