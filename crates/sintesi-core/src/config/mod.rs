mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// A remote reranker without a key is not an error: it is downgraded to
    /// keyword ranking, which is what every remote failure falls back to.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&mut self) -> anyhow::Result<()> {
        if self.index.embedding_batch_size == 0 {
            bail!("index.embedding_batch_size must be greater than 0");
        }
        if self.index.deletion_batch_size == 0 {
            bail!("index.deletion_batch_size must be greater than 0");
        }
        if self.index.concurrency == 0 {
            bail!("index.concurrency must be greater than 0");
        }
        if self.index.max_class_lines == 0 {
            bail!("index.max_class_lines must be greater than 0");
        }
        if self.retrieval.candidate_budget == 0 {
            bail!("retrieval.candidate_budget must be greater than 0");
        }
        if self.retrieval.default_limit == 0 {
            bail!("retrieval.default_limit must be greater than 0");
        }
        if self.timeouts.embedding_secs == 0 {
            bail!("timeouts.embedding_secs must be greater than 0");
        }
        if self.timeouts.rerank_secs == 0 {
            bail!("timeouts.rerank_secs must be greater than 0");
        }
        if self.rerank.strategy == RerankStrategyKind::Remote && self.secrets.rerank_api_key.is_none()
        {
            tracing::warn!("rerank.strategy = remote but SINTESI_RERANK_API_KEY is not set, using keyword ranking");
            self.rerank.strategy = RerankStrategyKind::Keyword;
        }
        Ok(())
    }

    #[must_use]
    pub fn project_root(&self) -> PathBuf {
        PathBuf::from(&self.project.root)
    }

    /// Ledger location, resolved against the project root when relative.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        let path = Path::new(&self.project.state_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root().join(path)
        }
    }
}
