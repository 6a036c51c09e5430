//! Incremental indexing and reranked retrieval over a vector store.
//!
//! Files are split into semantic chunks (tree-sitter for code, blank-line
//! blocks for prose), embedded in bounded batches, and written to a vector
//! store collection. A JSON ledger records which chunk ids each file owns so
//! later passes only touch what changed. Queries fetch a fixed candidate set,
//! rerank it (remotely, or with a deterministic keyword scorer) and render
//! the top hits as prompt context.

pub mod batch;
pub mod changes;
pub mod chunker;
pub(crate) mod context;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod rerank;
pub mod retriever;
pub mod state;
pub mod store;
pub mod watcher;

pub use chunker::{Chunk, ChunkExtractor, ChunkerConfig};
pub use context::{estimate_tokens, format_as_context};
pub use error::{ChangeDetectionError, IndexError, Result};
pub use indexer::{CHECKPOINT_INTERVAL, CodeIndexer, IndexReport, IndexerConfig};
pub use rerank::{KeywordReranker, RemoteReranker, RerankStrategy, Reranker};
pub use retriever::{CodeRetriever, RetrievalConfig};
pub use state::{IndexState, JsonStateStore, MemoryStateStore, StateStore};
pub use store::{ChunkStore, SearchCandidate, StoredChunk};
pub use watcher::IndexWatcher;
