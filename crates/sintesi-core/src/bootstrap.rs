//! Pipeline bootstrap: config resolution, provider/store/reranker construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sintesi_index::changes::DiscoveryConfig;
use sintesi_index::{
    ChunkStore, ChunkerConfig, CodeIndexer, CodeRetriever, IndexReport, IndexState, IndexWatcher,
    IndexerConfig, JsonStateStore, KeywordReranker, MemoryStateStore, RemoteReranker,
    RerankStrategy, RetrievalConfig, SearchCandidate, StateStore,
};
use sintesi_llm::http::client_with_timeout;
use sintesi_llm::openai::OpenAiEmbedder;
use sintesi_llm::{AnyEmbedder, EmbeddingProvider, RerankClient};
use sintesi_store::{InMemoryVectorStore, QdrantOps, VectorStore};

use crate::config::{Config, EmbeddingProviderKind, RerankStrategyKind, StoreBackend};

#[cfg(any(test, feature = "mock"))]
const MOCK_DIMENSIONS: usize = 384;

/// Priority: CLI `--config` > `SINTESI_CONFIG` env > `sintesi.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SINTESI_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("sintesi.toml")
}

/// Indexer and retriever wired to the same collection and embedder.
pub struct RagPipeline {
    indexer: Arc<CodeIndexer<AnyEmbedder>>,
    retriever: CodeRetriever<AnyEmbedder>,
    embedder_name: &'static str,
    root: PathBuf,
    watch_debounce: Duration,
}

impl RagPipeline {
    /// Build every component from a validated config.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding provider is unavailable in this build
    /// or the vector store client cannot be constructed.
    pub fn build(config: &Config) -> anyhow::Result<Self> {
        let embedder = Arc::new(create_embedder(config)?);
        let embedder_name = embedder.name();
        let store = create_vector_store(config)?;
        let chunks = Arc::new(
            ChunkStore::new(store, config.store.collection.clone())
                .with_delete_batch_size(config.index.deletion_batch_size),
        );
        let state_store = create_state_store(config);

        let indexer = Arc::new(CodeIndexer::new(
            Arc::clone(&chunks),
            Arc::clone(&embedder),
            state_store,
            indexer_config(config),
        ));
        let retriever = CodeRetriever::new(
            chunks,
            embedder,
            create_reranker(config),
            retrieval_config(config),
        );

        tracing::info!(
            root = %config.project.root,
            embedder = embedder_name,
            backend = ?config.store.backend,
            collection = %config.store.collection,
            "pipeline ready"
        );

        Ok(Self {
            indexer,
            retriever,
            embedder_name,
            root: config.project_root(),
            watch_debounce: Duration::from_millis(config.index.watch_debounce_ms),
        })
    }

    #[must_use]
    pub fn embedder_name(&self) -> &'static str {
        self.embedder_name
    }

    /// # Errors
    ///
    /// Returns an error if discovery fails or the ledger cannot be saved.
    pub async fn index_project(&self) -> anyhow::Result<IndexReport> {
        self.indexer
            .index_project()
            .await
            .context("indexing pass failed")
    }

    /// Drop every indexed chunk and forget the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the ledger cannot be cleared.
    pub async fn reset(&self) -> anyhow::Result<usize> {
        self.indexer.reset().await.context("failed to reset index")
    }

    /// # Errors
    ///
    /// Returns an error if embedding the query or searching the store fails.
    pub async fn retrieve(&self, query: &str, limit: usize) -> anyhow::Result<Vec<SearchCandidate>> {
        self.retriever
            .retrieve(query, limit)
            .await
            .context("retrieval failed")
    }

    /// Formatted context for a query; empty when nothing is found or retrieval fails.
    pub async fn retrieve_context(&self, query: &str, limit: Option<usize>) -> String {
        match limit {
            Some(limit) => self.retriever.retrieve_context(query, limit).await,
            None => self.retriever.retrieve_default(query).await,
        }
    }

    /// Start re-indexing on file changes. Dropping the watcher stops it.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be started.
    pub fn watch(&self) -> anyhow::Result<IndexWatcher> {
        IndexWatcher::start(&self.root, Arc::clone(&self.indexer), self.watch_debounce)
            .with_context(|| format!("failed to watch {}", self.root.display()))
    }
}

/// # Errors
///
/// Returns an error if the configured provider is not compiled in.
pub fn create_embedder(config: &Config) -> anyhow::Result<AnyEmbedder> {
    match config.embedding.provider {
        EmbeddingProviderKind::OpenAi => {
            let key = config
                .secrets
                .embedding_api_key
                .as_ref()
                .map(|s| s.expose().to_owned());
            if key.is_none() {
                tracing::debug!("no embedding API key set, sending unauthenticated requests");
            }
            let timeout = Duration::from_secs(config.timeouts.embedding_secs);
            let embedder = OpenAiEmbedder::new(
                key,
                config.embedding.base_url.clone(),
                config.embedding.model.clone(),
            )
            .with_client(client_with_timeout(timeout));
            Ok(AnyEmbedder::OpenAi(embedder))
        }
        #[cfg(any(test, feature = "mock"))]
        EmbeddingProviderKind::Mock => Ok(AnyEmbedder::Mock(
            sintesi_llm::mock::MockEmbedder::new(MOCK_DIMENSIONS),
        )),
        #[cfg(not(any(test, feature = "mock")))]
        EmbeddingProviderKind::Mock => {
            anyhow::bail!("embedding provider mock not available (feature not enabled)")
        }
    }
}

/// # Errors
///
/// Returns an error if the Qdrant client cannot be built from the URL.
pub fn create_vector_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.store.backend {
        StoreBackend::Qdrant => {
            let ops = QdrantOps::new(&config.store.qdrant_url)
                .with_context(|| format!("failed to create qdrant client for {}", config.store.qdrant_url))?;
            Ok(Arc::new(ops))
        }
        StoreBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
    }
}

/// An in-memory store starts empty every run, so its ledger must too.
#[must_use]
pub fn create_state_store(config: &Config) -> Arc<dyn StateStore> {
    match config.store.backend {
        StoreBackend::Qdrant => Arc::new(JsonStateStore::new(config.state_path())),
        StoreBackend::Memory => Arc::new(MemoryStateStore::new(IndexState::default())),
    }
}

#[must_use]
pub fn create_reranker(config: &Config) -> RerankStrategy {
    match config.rerank.strategy {
        RerankStrategyKind::Disabled => RerankStrategy::Disabled,
        RerankStrategyKind::Keyword => RerankStrategy::Keyword(KeywordReranker),
        RerankStrategyKind::Remote => {
            let timeout = Duration::from_secs(config.timeouts.rerank_secs);
            let client = RerankClient::new(
                config
                    .secrets
                    .rerank_api_key
                    .as_ref()
                    .map(|s| s.expose().to_owned()),
                config.rerank.base_url.clone(),
                config.rerank.model.clone(),
            )
            .with_client(client_with_timeout(timeout));
            if !client.has_credential() {
                tracing::warn!("remote reranker has no credential, using keyword ranking");
                return RerankStrategy::Keyword(KeywordReranker);
            }
            RerankStrategy::remote(RemoteReranker::new(client, timeout))
        }
    }
}

#[must_use]
pub fn indexer_config(config: &Config) -> IndexerConfig {
    IndexerConfig {
        root: config.project_root(),
        embedding_batch_size: config.index.embedding_batch_size,
        concurrency: config.index.concurrency,
        embed_timeout: Duration::from_secs(config.timeouts.embedding_secs),
        use_git: config.index.use_git,
        discovery: DiscoveryConfig {
            respect_gitignore: config.index.respect_gitignore,
            include_hidden: config.index.include_hidden,
            max_file_bytes: config.index.max_file_bytes,
        },
        chunker: ChunkerConfig {
            max_class_lines: config.index.max_class_lines,
        },
    }
}

#[must_use]
pub fn retrieval_config(config: &Config) -> RetrievalConfig {
    RetrievalConfig {
        candidate_budget: config.retrieval.candidate_budget,
        default_limit: config.retrieval.default_limit,
        max_context_tokens: (config.retrieval.max_context_tokens > 0)
            .then_some(config.retrieval.max_context_tokens),
        embed_timeout: Duration::from_secs(config.timeouts.embedding_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::Secret;

    fn memory_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.project.root = root.display().to_string();
        config.embedding.provider = EmbeddingProviderKind::Mock;
        config.store.backend = StoreBackend::Memory;
        config.index.use_git = false;
        config
    }

    #[test]
    fn config_path_prefers_cli_flag() {
        let path = resolve_config_path(Some(Path::new("/etc/sintesi.toml")));
        assert_eq!(path, Path::new("/etc/sintesi.toml"));
    }

    #[test]
    fn indexer_config_follows_index_section() {
        let mut config = Config::default();
        config.index.embedding_batch_size = 7;
        config.index.max_class_lines = 120;
        config.index.include_hidden = true;
        config.timeouts.embedding_secs = 12;

        let ic = indexer_config(&config);
        assert_eq!(ic.embedding_batch_size, 7);
        assert_eq!(ic.chunker.max_class_lines, 120);
        assert!(ic.discovery.include_hidden);
        assert_eq!(ic.embed_timeout, Duration::from_secs(12));
    }

    #[test]
    fn zero_token_cap_means_uncapped() {
        let mut config = Config::default();
        assert_eq!(retrieval_config(&config).max_context_tokens, None);
        config.retrieval.max_context_tokens = 800;
        assert_eq!(retrieval_config(&config).max_context_tokens, Some(800));
    }

    #[test]
    fn reranker_matches_strategy() {
        let mut config = Config::default();
        assert_eq!(create_reranker(&config).name(), "keyword");
        config.rerank.strategy = RerankStrategyKind::Disabled;
        assert_eq!(create_reranker(&config).name(), "none");
        config.rerank.strategy = RerankStrategyKind::Remote;
        config.secrets.rerank_api_key = Some(Secret::new("rk"));
        assert_eq!(create_reranker(&config).name(), "remote");
    }

    #[test]
    fn unvalidated_keyless_remote_builds_keyword_reranker() {
        let mut config = Config::default();
        config.rerank.strategy = RerankStrategyKind::Remote;
        config.secrets.rerank_api_key = Some(Secret::new(""));
        assert_eq!(create_reranker(&config).name(), "keyword");
        config.secrets.rerank_api_key = None;
        assert_eq!(create_reranker(&config).name(), "keyword");
    }

    #[test]
    fn openai_embedder_builds_without_key() {
        let config = Config::default();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.name(), "openai");
    }

    #[tokio::test]
    async fn memory_pipeline_indexes_and_retrieves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("session.py"),
            "def refresh_session(token):\n    return token.split('.')[1]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.md"), "Pricing tiers are reviewed yearly.\n").unwrap();

        let pipeline = RagPipeline::build(&memory_config(dir.path())).unwrap();
        assert_eq!(pipeline.embedder_name(), "mock");

        let report = pipeline.index_project().await.unwrap();
        assert_eq!(report.files_added, 2);
        assert!(report.errors.is_empty());

        let context = pipeline
            .retrieve_context("refresh_session token", Some(1))
            .await;
        assert!(context.contains("file=\"session.py\""));
        assert!(context.contains("Function refresh_session"));

        let again = pipeline.index_project().await.unwrap();
        assert_eq!(again.files_unchanged, 2);
        assert_eq!(again.chunks_created, 0);
    }

    #[tokio::test]
    async fn reset_clears_memory_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "alpha\n\nbeta\n").unwrap();

        let pipeline = RagPipeline::build(&memory_config(dir.path())).unwrap();
        let report = pipeline.index_project().await.unwrap();
        assert_eq!(pipeline.reset().await.unwrap(), report.chunks_created);
        assert_eq!(pipeline.retrieve_context("alpha", None).await, "");
    }

    #[tokio::test]
    async fn watch_starts_on_existing_root() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = RagPipeline::build(&memory_config(dir.path())).unwrap();
        assert!(pipeline.watch().is_ok());
    }
}
