//! Client for Cohere/Jina-compatible `/rerank` endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::retry::{DEFAULT_MAX_RETRIES, send_with_retry};

const PROVIDER: &str = "rerank";

pub struct RerankClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl fmt::Debug for RerankClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RerankClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl RerankClient {
    #[must_use]
    pub fn new(api_key: Option<String>, mut base_url: String, model: String) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url,
            model,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Rank `documents` against `query`.
    ///
    /// The result is always a full permutation of `0..documents.len()`:
    /// out-of-range and repeated indices from the provider are dropped and any
    /// index the provider left out is appended in original order.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingCredential` without touching the network when
    /// no key is configured, or any transport, status or decoding error.
    pub async fn rerank(&self, query: &str, documents: &[&str]) -> Result<Vec<usize>, LlmError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(LlmError::MissingCredential { provider: PROVIDER });
        };
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n: documents.len(),
        };
        let url = format!("{}/rerank", self.base_url);

        let response = send_with_retry(PROVIDER, DEFAULT_MAX_RETRIES, || {
            self.client.post(&url).bearer_auth(key).json(&body).send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;
        if !status.is_success() {
            tracing::warn!(%status, body = %text, "rerank API error");
            return Err(LlmError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        let mut resp: RerankResponse = serde_json::from_str(&text)?;
        if resp.results.is_empty() {
            return Err(LlmError::EmptyResponse { provider: PROVIDER });
        }
        resp.results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(complete_permutation(
            resp.results.iter().map(|r| r.index),
            documents.len(),
        ))
    }
}

fn complete_permutation(ranked: impl Iterator<Item = usize>, len: usize) -> Vec<usize> {
    let mut seen = vec![false; len];
    let mut order = Vec::with_capacity(len);
    for idx in ranked {
        if idx < len && !seen[idx] {
            seen[idx] = true;
            order.push(idx);
        }
    }
    order.extend((0..len).filter(|i| !seen[*i]));
    order
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [&'a str],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}
