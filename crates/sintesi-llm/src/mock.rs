//! Deterministic in-process embedder for tests and offline runs.

use std::sync::{Arc, Mutex};

use crate::embed::EmbeddingProvider;
use crate::error::LlmError;

pub const DEFAULT_DIMENSIONS: usize = 256;

/// Hashed bag-of-words embedder.
///
/// Every call is recorded so tests can assert on batch counts and order.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    fail_marker: Option<String>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            fail_marker: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail any batch containing a text that includes `marker`.
    #[must_use]
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    pub fn reset_calls(&self) {
        if let Ok(mut c) = self.calls.lock() {
            c.clear();
        }
    }

    #[must_use]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            #[expect(clippy::cast_possible_truncation)]
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimensions as u64) as usize;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl EmbeddingProvider for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(texts.to_vec());
        }
        if let Some(marker) = &self.fail_marker
            && texts.iter().any(|t| t.contains(marker.as_str()))
        {
            return Err(LlmError::Other(format!("mock embedding failure on {marker}")));
        }
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_identical_vector() {
        let m = MockEmbedder::default();
        assert_eq!(m.embed_text("fn login()"), m.embed_text("fn login()"));
    }

    #[test]
    fn vector_is_normalized() {
        let m = MockEmbedder::new(16);
        let v = m.embed_text("alpha beta gamma");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn records_calls_and_fails_on_marker() {
        let m = MockEmbedder::default().failing_on("BOOM");
        let ok = m.embed_batch(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(ok.len(), 2);
        assert!(m.embed_batch(&["xBOOMx".into()]).await.is_err());
        assert_eq!(m.call_count(), 2);
        assert_eq!(m.calls()[0], vec!["a".to_owned(), "b".to_owned()]);
    }
}
