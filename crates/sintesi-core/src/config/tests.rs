use std::io::Write;
use std::path::Path;

use serial_test::serial;

use super::*;
use crate::secret::Secret;

const ENV_KEYS: [&str; 20] = [
    "SINTESI_PROJECT_ROOT",
    "SINTESI_STATE_PATH",
    "SINTESI_EMBEDDING_PROVIDER",
    "SINTESI_EMBEDDING_BASE_URL",
    "SINTESI_EMBEDDING_MODEL",
    "SINTESI_EMBEDDING_API_KEY",
    "SINTESI_STORE_BACKEND",
    "SINTESI_QDRANT_URL",
    "SINTESI_COLLECTION",
    "SINTESI_INDEX_EMBEDDING_BATCH_SIZE",
    "SINTESI_INDEX_DELETION_BATCH_SIZE",
    "SINTESI_INDEX_CONCURRENCY",
    "SINTESI_INDEX_USE_GIT",
    "SINTESI_RETRIEVAL_CANDIDATE_BUDGET",
    "SINTESI_RETRIEVAL_DEFAULT_LIMIT",
    "SINTESI_RERANK_STRATEGY",
    "SINTESI_RERANK_API_KEY",
    "SINTESI_TIMEOUT_EMBEDDING",
    "SINTESI_TIMEOUT_RERANK",
    "SINTESI_LOG_LEVEL",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
#[serial]
fn defaults_when_file_missing() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/sintesi.toml")).unwrap();
    assert_eq!(config.project.root, ".");
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::OpenAi);
    assert_eq!(config.embedding.model, "text-embedding-3-small");
    assert_eq!(config.store.backend, StoreBackend::Qdrant);
    assert_eq!(config.store.collection, "sintesi_chunks");
    assert_eq!(config.index.embedding_batch_size, 20);
    assert_eq!(config.index.deletion_batch_size, 50);
    assert_eq!(config.index.max_class_lines, 300);
    assert!(config.index.use_git);
    assert_eq!(config.retrieval.candidate_budget, 20);
    assert_eq!(config.retrieval.default_limit, 5);
    assert_eq!(config.rerank.strategy, RerankStrategyKind::Keyword);
    assert_eq!(config.timeouts.embedding_secs, 30);
    assert_eq!(config.log_level, "info");
    assert!(config.secrets.embedding_api_key.is_none());
}

#[test]
#[serial]
fn parses_partial_toml() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sintesi.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
        f,
        r#"
[project]
root = "/srv/app"

[store]
backend = "memory"

[index]
embedding_batch_size = 8
use_git = false

[rerank]
strategy = "none"
"#
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.project.root, "/srv/app");
    assert_eq!(config.project.state_path, ".sintesi/index-state.json");
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.index.embedding_batch_size, 8);
    assert_eq!(config.index.deletion_batch_size, 50);
    assert!(!config.index.use_git);
    assert_eq!(config.rerank.strategy, RerankStrategyKind::Disabled);
}

#[test]
#[serial]
fn invalid_toml_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sintesi.toml");
    std::fs::write(&path, "[index\nconcurrency = ").unwrap();
    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sintesi.toml");
    std::fs::write(&path, "[index]\nconcurrency = 2\n").unwrap();

    unsafe {
        std::env::set_var("SINTESI_INDEX_CONCURRENCY", "9");
        std::env::set_var("SINTESI_STORE_BACKEND", "memory");
        std::env::set_var("SINTESI_RERANK_STRATEGY", "remote");
        std::env::set_var("SINTESI_RERANK_API_KEY", "rk-test");
        std::env::set_var("SINTESI_TIMEOUT_RERANK", "3");
        std::env::set_var("SINTESI_INDEX_USE_GIT", "false");
    }
    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.index.concurrency, 9);
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.rerank.strategy, RerankStrategyKind::Remote);
    assert_eq!(config.timeouts.rerank_secs, 3);
    assert!(!config.index.use_git);
    assert_eq!(
        config.secrets.rerank_api_key.as_ref().map(Secret::expose),
        Some("rk-test")
    );
}

#[test]
#[serial]
fn unparseable_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("SINTESI_INDEX_EMBEDDING_BATCH_SIZE", "lots");
        std::env::set_var("SINTESI_EMBEDDING_PROVIDER", "carrier-pigeon");
        std::env::set_var("SINTESI_EMBEDDING_API_KEY", "");
    }
    let config = Config::load(Path::new("/nonexistent/sintesi.toml")).unwrap();
    clear_env();

    assert_eq!(config.index.embedding_batch_size, 20);
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::OpenAi);
    assert!(config.secrets.embedding_api_key.is_none());
}

#[test]
fn validate_rejects_zero_sizes() {
    let mut config = Config::default();
    config.index.deletion_batch_size = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("deletion_batch_size"));

    let mut config = Config::default();
    config.retrieval.candidate_budget = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.index.concurrency = 0;
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_zero_timeouts() {
    let mut config = Config::default();
    config.timeouts.embedding_secs = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("timeouts.embedding_secs"));

    let mut config = Config::default();
    config.timeouts.rerank_secs = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("timeouts.rerank_secs"));
}

#[test]
fn keyless_remote_rerank_falls_back_to_keyword() {
    let mut config = Config::default();
    config.rerank.strategy = RerankStrategyKind::Remote;
    config.validate().unwrap();
    assert_eq!(config.rerank.strategy, RerankStrategyKind::Keyword);

    let mut config = Config::default();
    config.rerank.strategy = RerankStrategyKind::Remote;
    config.secrets.rerank_api_key = Some(Secret::new("rk"));
    config.validate().unwrap();
    assert_eq!(config.rerank.strategy, RerankStrategyKind::Remote);
}

#[test]
fn state_path_resolves_against_root() {
    let mut config = Config::default();
    config.project.root = "/srv/app".into();
    assert_eq!(
        config.state_path(),
        Path::new("/srv/app/.sintesi/index-state.json")
    );

    config.project.state_path = "/var/lib/sintesi/state.json".into();
    assert_eq!(config.state_path(), Path::new("/var/lib/sintesi/state.json"));
}
