//! Parley: a browser chat page backed by a hosted generative model.

mod app;
mod session_cookie;

use anyhow::{Context, Result};
use clap::Parser;
use parley_api::GeminiProvider;
use parley_config::{CliOverrides, ParleyConfig, SessionBackend};
use parley_core::{Orchestrator, UploadDir};
use parley_session::{FileSessionStore, MemorySessionStore, SessionStore};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How often idle sessions are swept.
const PRUNE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Parser)]
#[command(name = "parley", version, about = "Chat with a hosted model from the browser")]
struct Cli {
    /// Path to a config file (default: ~/.parley/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides PARLEY_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// Where sessions are kept: memory or file
    #[arg(long)]
    session_backend: Option<SessionBackend>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = ParleyConfig::load(CliOverrides {
        config_path: cli.config,
        bind: cli.bind,
        model: cli.model,
        session_backend: cli.session_backend,
    })
    .context("Failed to load configuration")?;
    tracing::debug!("Loaded config: {config:?}");

    let provider = GeminiProvider::new(
        &config.api_key,
        &config.api_base_url,
        &config.model,
        config.connect_timeout,
        config.request_timeout,
    )
    .context("Failed to create API client")?;

    let store: Arc<dyn SessionStore> = match config.session_backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        SessionBackend::File => Arc::new(
            FileSessionStore::new(config.data_dir.clone())
                .await
                .context("Failed to open session directory")?,
        ),
    };
    let uploads = UploadDir::new(config.upload_dir.clone())
        .await
        .with_context(|| format!("Failed to create {}", config.upload_dir.display()))?;

    tracing::info!(
        "Using model {} with {} session store",
        provider.model(),
        store.name()
    );

    let orchestrator = Orchestrator::new(
        Arc::new(provider),
        store,
        uploads,
        config.generation,
        config.poll.clone(),
    );
    let orchestrator = Arc::new(orchestrator);
    tokio::spawn(prune_sessions(
        Arc::clone(&orchestrator),
        config.session_max_idle,
    ));

    let state = app::AppState::new(orchestrator, &config.secret_key);
    let router = app::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!("Listening on http://{}", config.bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn prune_sessions(orchestrator: Arc<Orchestrator>, max_idle: Duration) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL.min(max_idle));
    loop {
        interval.tick().await;
        if let Err(e) = orchestrator.prune_idle(max_idle).await {
            tracing::warn!("Idle session sweep failed: {e}");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
