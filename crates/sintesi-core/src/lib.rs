//! Configuration loading and wiring of the indexing/retrieval pipeline.

pub mod bootstrap;
pub mod config;
pub mod secret;

pub use bootstrap::RagPipeline;
pub use config::Config;
pub use secret::Secret;
