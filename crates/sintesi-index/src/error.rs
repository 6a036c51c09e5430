/// Errors that can occur during code indexing and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error (reading source files, persisting state).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Vector store failure.
    #[error("vector store error: {0}")]
    VectorStore(#[from] sintesi_store::VectorStoreError),

    /// Embedding or rerank provider failure.
    #[error("provider error: {0}")]
    Llm(#[from] sintesi_llm::LlmError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structural parse failed; handled inside the chunker.
    #[error("parse failed: {0}")]
    Parse(String),

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// Provider returned a different number of vectors than texts sent.
    #[error("embedding count mismatch: sent {expected}, received {actual}")]
    EmbeddingCount { expected: usize, actual: usize },

    /// Revision-based change detection is unavailable.
    #[error(transparent)]
    ChangeDetection(#[from] ChangeDetectionError),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Background task join failure.
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

/// Why revision-based change detection could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ChangeDetectionError {
    /// `git` could not be spawned.
    #[error("git unavailable: {0}")]
    GitUnavailable(#[source] std::io::Error),

    /// `git` ran but failed (not a repository, unknown revision, ...).
    #[error("git {command} failed: {stderr}")]
    GitFailed { command: String, stderr: String },
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
