use crate::secret::Secret;

use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_core();
        self.apply_env_overrides_tuning();
        self.apply_env_secrets();
    }

    fn apply_env_overrides_core(&mut self) {
        if let Ok(v) = std::env::var("SINTESI_PROJECT_ROOT") {
            self.project.root = v;
        }
        if let Ok(v) = std::env::var("SINTESI_STATE_PATH") {
            self.project.state_path = v;
        }
        if let Ok(v) = std::env::var("SINTESI_EMBEDDING_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid SINTESI_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SINTESI_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("SINTESI_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("SINTESI_STORE_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.store.backend = backend;
            } else {
                tracing::warn!("ignoring invalid SINTESI_STORE_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SINTESI_QDRANT_URL") {
            self.store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("SINTESI_COLLECTION") {
            self.store.collection = v;
        }
        if let Ok(v) = std::env::var("SINTESI_RERANK_STRATEGY") {
            if let Ok(strategy) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.rerank.strategy = strategy;
            } else {
                tracing::warn!("ignoring invalid SINTESI_RERANK_STRATEGY value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SINTESI_LOG_LEVEL") {
            self.log_level = v;
        }
    }

    fn apply_env_overrides_tuning(&mut self) {
        if let Ok(v) = std::env::var("SINTESI_INDEX_EMBEDDING_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.embedding_batch_size = n;
        }
        if let Ok(v) = std::env::var("SINTESI_INDEX_DELETION_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.deletion_batch_size = n;
        }
        if let Ok(v) = std::env::var("SINTESI_INDEX_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.concurrency = n;
        }
        if let Ok(v) = std::env::var("SINTESI_INDEX_USE_GIT")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.index.use_git = enabled;
        }
        if let Ok(v) = std::env::var("SINTESI_RETRIEVAL_CANDIDATE_BUDGET")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.candidate_budget = n;
        }
        if let Ok(v) = std::env::var("SINTESI_RETRIEVAL_DEFAULT_LIMIT")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.default_limit = n;
        }
        if let Ok(v) = std::env::var("SINTESI_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding_secs = secs;
        }
        if let Ok(v) = std::env::var("SINTESI_TIMEOUT_RERANK")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.rerank_secs = secs;
        }
    }

    fn apply_env_secrets(&mut self) {
        if let Ok(v) = std::env::var("SINTESI_EMBEDDING_API_KEY")
            && !v.is_empty()
        {
            self.secrets.embedding_api_key = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("SINTESI_RERANK_API_KEY")
            && !v.is_empty()
        {
            self.secrets.rerank_api_key = Some(Secret::new(v));
        }
    }
}
