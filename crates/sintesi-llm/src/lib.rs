//! Embedding and rerank provider clients.
//!
//! The indexing core only sees the [`EmbeddingProvider`] trait and the
//! [`RerankClient`]; concrete HTTP backends live here.

pub mod any;
pub mod embed;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod rerank;
pub(crate) mod retry;

pub use any::AnyEmbedder;
pub use embed::EmbeddingProvider;
pub use error::{LlmError, Result};
pub use rerank::RerankClient;
