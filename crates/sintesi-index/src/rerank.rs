//! Candidate reordering.
//!
//! [`RerankStrategy`] is chosen once at construction. The remote variant
//! always carries a [`KeywordReranker`] and switches to it whenever the
//! provider fails, so reranking can degrade but never abort retrieval.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use sintesi_llm::RerankClient;

use crate::error::{IndexError, Result};
use crate::store::SearchCandidate;

/// Score bonus when the whole query appears verbatim in a candidate.
pub const PHRASE_BONUS: u32 = 10;
/// Query tokens shorter than this are ignored.
pub const MIN_TOKEN_CHARS: usize = 3;

/// Orders candidates by relevance to a query.
pub trait Reranker: Send + Sync {
    /// Permutation of `0..candidates.len()`, most relevant first.
    ///
    /// # Errors
    ///
    /// Returns an error if the ordering could not be computed.
    fn rerank(
        &self,
        query: &str,
        candidates: &[SearchCandidate],
    ) -> impl Future<Output = Result<Vec<usize>>> + Send;
}

/// Deterministic keyword-overlap scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordReranker;

impl KeywordReranker {
    /// Score of `content` against `query`: [`PHRASE_BONUS`] if the normalized
    /// query occurs in the normalized content, plus one per distinct query
    /// token longer than two characters found anywhere in it.
    #[must_use]
    pub fn score(query: &str, content: &str) -> u32 {
        let query = normalize(query);
        let content = normalize(content);
        let mut score = 0;
        if !query.is_empty() && content.contains(&query) {
            score += PHRASE_BONUS;
        }
        let tokens: BTreeSet<&str> = query
            .split(' ')
            .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
            .collect();
        for token in tokens {
            if content.contains(token) {
                score += 1;
            }
        }
        score
    }

    /// Indices sorted by descending score; equal scores keep input order.
    #[must_use]
    pub fn order(self, query: &str, candidates: &[SearchCandidate]) -> Vec<usize> {
        let scores: Vec<u32> = candidates
            .iter()
            .map(|c| Self::score(query, &c.content))
            .collect();
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|a, b| scores[*b].cmp(&scores[*a]));
        order
    }
}

impl Reranker for KeywordReranker {
    async fn rerank(&self, query: &str, candidates: &[SearchCandidate]) -> Result<Vec<usize>> {
        Ok(self.order(query, candidates))
    }
}

/// Lowercase, drop punctuation, collapse whitespace to single spaces.
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reranker backed by a remote rerank endpoint.
#[derive(Debug)]
pub struct RemoteReranker {
    client: RerankClient,
    timeout: Duration,
}

impl RemoteReranker {
    #[must_use]
    pub fn new(client: RerankClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Reranker for RemoteReranker {
    async fn rerank(&self, query: &str, candidates: &[SearchCandidate]) -> Result<Vec<usize>> {
        let documents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        tokio::time::timeout(self.timeout, self.client.rerank(query, &documents))
            .await
            .map_err(|_| IndexError::Timeout {
                operation: "rerank",
                secs: self.timeout.as_secs(),
            })?
            .map_err(IndexError::from)
    }
}

/// Reranking mode selected from configuration.
#[derive(Debug)]
pub enum RerankStrategy {
    /// Keep the store's similarity order.
    Disabled,
    Keyword(KeywordReranker),
    Remote {
        remote: RemoteReranker,
        fallback: KeywordReranker,
    },
}

impl RerankStrategy {
    #[must_use]
    pub fn remote(remote: RemoteReranker) -> Self {
        Self::Remote {
            remote,
            fallback: KeywordReranker,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disabled => "none",
            Self::Keyword(_) => "keyword",
            Self::Remote { .. } => "remote",
        }
    }

    /// Full permutation of the candidates; never fails.
    pub async fn order(&self, query: &str, candidates: &[SearchCandidate]) -> Vec<usize> {
        match self {
            Self::Disabled => (0..candidates.len()).collect(),
            Self::Keyword(keyword) => keyword.order(query, candidates),
            Self::Remote { remote, fallback } => match remote.rerank(query, candidates).await {
                Ok(order) => order,
                Err(e) => {
                    tracing::warn!(error = %e, "remote rerank failed, using keyword ranking");
                    fallback.order(query, candidates)
                }
            },
        }
    }
}
