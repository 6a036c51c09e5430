use std::future::Future;

use crate::error::LlmError;

/// Converts batches of text into vectors.
///
/// Implementations return exactly one vector per input, in input order, and
/// surface every failure to the caller. Batching to a bounded request size is
/// the caller's job.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `texts`, one vector per entry.
    ///
    /// # Errors
    ///
    /// Returns an error on transport, quota or decoding failure, or when the
    /// provider answers with a different number of vectors than inputs.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    fn name(&self) -> &'static str;
}

impl<T: EmbeddingProvider> EmbeddingProvider for std::sync::Arc<T> {
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send {
        (**self).embed_batch(texts)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
