use serde::{Deserialize, Serialize};

use crate::secret::Secret;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            timeouts: TimeoutConfig::default(),
            log_level: default_log_level(),
            secrets: ResolvedSecrets::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

/// Credentials read from the environment only, never from the file.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub embedding_api_key: Option<Secret>,
    pub rerank_api_key: Option<Secret>,
}

fn default_root() -> String {
    ".".into()
}

fn default_state_path() -> String {
    ".sintesi/index-state.json".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    #[serde(default = "default_root")]
    pub root: String,
    /// Relative paths resolve against `root`.
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            state_path: default_state_path(),
        }
    }
}

/// Embedding backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Any OpenAI-compatible `/embeddings` endpoint, Ollama's `/v1` included.
    #[default]
    OpenAi,
    /// Deterministic offline embedder; requires the `mock` feature.
    Mock,
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Qdrant,
    /// Process-local store; nothing survives a restart.
    Memory,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection() -> String {
    "sintesi_chunks".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            qdrant_url: default_qdrant_url(),
            collection: default_collection(),
        }
    }
}

fn default_embedding_batch_size() -> usize {
    20
}

fn default_deletion_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    4
}

fn default_max_class_lines() -> usize {
    300
}

fn default_true() -> bool {
    true
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_watch_debounce_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct IndexConfig {
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    #[serde(default = "default_deletion_batch_size")]
    pub deletion_batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_class_lines")]
    pub max_class_lines: usize,
    #[serde(default = "default_true")]
    pub use_git: bool,
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            embedding_batch_size: default_embedding_batch_size(),
            deletion_batch_size: default_deletion_batch_size(),
            concurrency: default_concurrency(),
            max_class_lines: default_max_class_lines(),
            use_git: true,
            respect_gitignore: true,
            include_hidden: false,
            max_file_bytes: default_max_file_bytes(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

fn default_candidate_budget() -> usize {
    20
}

fn default_limit() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_candidate_budget")]
    pub candidate_budget: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// 0 disables the token cap.
    #[serde(default)]
    pub max_context_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_budget: default_candidate_budget(),
            default_limit: default_limit(),
            max_context_tokens: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankStrategyKind {
    #[serde(rename = "none")]
    Disabled,
    #[default]
    Keyword,
    /// Remote provider with keyword fallback.
    Remote,
}

fn default_rerank_base_url() -> String {
    "https://api.cohere.com/v2".into()
}

fn default_rerank_model() -> String {
    "rerank-v3.5".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankConfig {
    #[serde(default)]
    pub strategy: RerankStrategyKind,
    #[serde(default = "default_rerank_base_url")]
    pub base_url: String,
    #[serde(default = "default_rerank_model")]
    pub model: String,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            strategy: RerankStrategyKind::default(),
            base_url: default_rerank_base_url(),
            model: default_rerank_model(),
        }
    }
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_rerank_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_embedding_timeout")]
    pub embedding_secs: u64,
    #[serde(default = "default_rerank_timeout")]
    pub rerank_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_secs: default_embedding_timeout(),
            rerank_secs: default_rerank_timeout(),
        }
    }
}
