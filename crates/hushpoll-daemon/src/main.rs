//! Daemon entrypoint: config, storage, sweeper, signal handling.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hushpoll_core::scheme::{BfvProvider, SchemeProvider};
use hushpoll_core::PollConfig;
use hushpoll_daemon::{ExpirySweeper, QuestionnaireService, SqliteStore};

#[derive(Debug, Parser)]
#[command(name = "hushpoll-daemon", about = "Encrypted questionnaire daemon", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the SQLite database path.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Override the sweeper interval in seconds.
    #[arg(long)]
    sweep_interval_secs: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => PollConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PollConfig::default(),
    };
    if let Some(db) = args.db {
        config.storage.db_path = db;
    }
    if let Some(secs) = args.sweep_interval_secs {
        config.sweeper.poll_interval_secs = secs;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: PollConfig) -> anyhow::Result<()> {
    let store = SqliteStore::open(&config.storage.db_path)
        .with_context(|| format!("failed to open {}", config.storage.db_path.display()))?;
    let provider: Arc<dyn SchemeProvider> = Arc::new(BfvProvider::new());
    // Fail fast if the configured defaults are unusable; per-questionnaire
    // parameters are resolved lazily as rows are touched.
    provider
        .scheme_for(config.crypto)
        .context("unusable cipher parameters")?;

    let service = QuestionnaireService::new(store.clone(), provider.clone(), config.crypto);
    service.health().context("storage health check failed")?;
    info!(
        db = %config.storage.db_path.display(),
        questionnaires = service.list()?.len(),
        "store opened"
    );

    let sweeper = ExpirySweeper::new(
        store,
        provider,
        Duration::from_secs(config.sweeper.poll_interval_secs),
    );
    let handle = sweeper.spawn();

    shutdown_signal().await.context("signal handler failed")?;
    info!("shutdown signal received");
    handle.shutdown().await;
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut term =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
