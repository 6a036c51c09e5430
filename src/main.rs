use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sintesi_core::bootstrap::resolve_config_path;
use sintesi_core::{Config, RagPipeline};
use sintesi_index::IndexReport;

#[derive(Debug, Parser)]
#[command(name = "sintesi", version, about = "Index a project and retrieve reranked context")]
struct Cli {
    /// Config file (defaults to $SINTESI_CONFIG, then ./sintesi.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one incremental indexing pass
    Index {
        /// Drop the existing index and ledger first
        #[arg(long)]
        full: bool,
    },
    /// Print the formatted context for a query
    Query {
        text: String,
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// Index once, then re-index on file changes until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_subscriber(&config.log_level);
    config.validate()?;

    let pipeline = RagPipeline::build(&config)?;

    match cli.command {
        Command::Index { full } => {
            if full {
                let removed = pipeline.reset().await?;
                tracing::info!(removed, "index reset");
            }
            let report = pipeline.index_project().await?;
            print_report(&report);
            if !report.errors.is_empty() {
                anyhow::bail!("{} file(s) failed to index", report.errors.len());
            }
        }
        Command::Query { text, limit } => {
            let context = pipeline.retrieve_context(&text, limit).await;
            if context.is_empty() {
                eprintln!("no matching context");
            } else {
                println!("{context}");
            }
        }
        Command::Watch => {
            let report = pipeline.index_project().await?;
            print_report(&report);
            let _watcher = pipeline.watch()?;
            tracing::info!(root = %config.project.root, "watching for changes, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_subscriber(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_report(report: &IndexReport) {
    println!(
        "scanned {} files: {} added, {} modified, {} deleted, {} unchanged",
        report.files_scanned,
        report.files_added,
        report.files_modified,
        report.files_deleted,
        report.files_unchanged,
    );
    println!(
        "chunks: +{} -{} ({} embedding calls, {} ms)",
        report.chunks_created, report.chunks_removed, report.embedding_calls, report.duration_ms,
    );
    for error in &report.errors {
        eprintln!("  error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_query_with_limit() {
        let cli = Cli::try_parse_from(["sintesi", "query", "how login works", "--limit", "3"]).unwrap();
        match cli.command {
            Command::Query { text, limit } => {
                assert_eq!(text, "how login works");
                assert_eq!(limit, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["sintesi", "index", "--full", "--config", "/tmp/s.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.toml")));
        assert!(matches!(cli.command, Command::Index { full: true }));
    }

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["sintesi"]).is_err());
    }
}
