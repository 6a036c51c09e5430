//! Query-time retrieval: embed → fixed candidate fetch → rerank → truncate.

use std::sync::Arc;
use std::time::Duration;

use sintesi_llm::EmbeddingProvider;

use crate::context::{apply_token_budget, format_as_context};
use crate::error::{IndexError, Result};
use crate::rerank::RerankStrategy;
use crate::store::{ChunkStore, SearchCandidate};

pub const DEFAULT_CANDIDATE_BUDGET: usize = 20;
pub const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Candidates fetched from the store per query, whatever the limit.
    pub candidate_budget: usize,
    pub default_limit: usize,
    /// Token cap on the formatted context; `None` for no cap.
    pub max_context_tokens: Option<usize>,
    pub embed_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_budget: DEFAULT_CANDIDATE_BUDGET,
            default_limit: DEFAULT_LIMIT,
            max_context_tokens: None,
            embed_timeout: Duration::from_secs(30),
        }
    }
}

/// Read-only query side of the index.
pub struct CodeRetriever<E: EmbeddingProvider> {
    store: Arc<ChunkStore>,
    embedder: Arc<E>,
    reranker: RerankStrategy,
    config: RetrievalConfig,
}

impl<E: EmbeddingProvider> CodeRetriever<E> {
    #[must_use]
    pub fn new(
        store: Arc<ChunkStore>,
        embedder: Arc<E>,
        reranker: RerankStrategy,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Top `limit` chunks for `query`, most relevant first.
    ///
    /// Always asks the store for `candidate_budget` candidates and reranks
    /// all of them before truncating.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded or the store search
    /// fails. Reranking failures never surface here.
    pub async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<SearchCandidate>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let timeout = self.config.embed_timeout;
        let mut vectors = tokio::time::timeout(
            timeout,
            self.embedder.embed_batch(&[query.to_owned()]),
        )
        .await
        .map_err(|_| IndexError::Timeout {
            operation: "query embedding",
            secs: timeout.as_secs(),
        })??;
        let vector = vectors.pop().ok_or(IndexError::EmbeddingCount {
            expected: 1,
            actual: 0,
        })?;

        let candidates = self
            .store
            .search(vector, self.config.candidate_budget)
            .await?;
        let order = self.reranker.order(query, &candidates).await;

        let mut slots: Vec<Option<SearchCandidate>> = candidates.into_iter().map(Some).collect();
        let ranked: Vec<SearchCandidate> = order
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .take(limit)
            .collect();

        tracing::debug!(
            query,
            candidates = slots.len(),
            returned = ranked.len(),
            reranker = self.reranker.name(),
            "retrieved"
        );
        Ok(apply_token_budget(ranked, self.config.max_context_tokens))
    }

    /// Formatted context for `query`; empty when retrieval fails.
    pub async fn retrieve_context(&self, query: &str, limit: usize) -> String {
        match self.retrieve(query, limit).await {
            Ok(candidates) => format_as_context(&candidates),
            Err(e) => {
                tracing::warn!(error = %e, "context retrieval failed");
                String::new()
            }
        }
    }

    /// [`Self::retrieve_context`] with the configured default limit.
    pub async fn retrieve_default(&self, query: &str) -> String {
        self.retrieve_context(query, self.config.default_limit).await
    }
}
