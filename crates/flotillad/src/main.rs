//! flotillad — the Flotilla daemon.
//!
//! Single binary that assembles the orchestration engine:
//! - State store (redb)
//! - Task executor over the provisioner
//! - Formation orchestrator (scale / balance / calculate / converge)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! flotillad standalone --port 8350 --data-dir /var/lib/flotilla
//! ```
//!
//! Standalone mode wires the in-process mock provisioner, which makes a
//! single binary a full, self-contained control plane for development.
//! Real provider backends plug in behind the `Provisioner` trait.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use config::DaemonConfig;
use flotilla_orchestrator::Orchestrator;
use flotilla_tasks::{MockProvisioner, TaskExecutor};

#[derive(Parser)]
#[command(name = "flotillad", about = "Flotilla orchestration daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in standalone mode (single process, mock provisioner).
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value = "8350")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/flotilla")]
        data_dir: PathBuf,

        /// Optional TOML file with orchestration tunables.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flotillad=debug,flotilla=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            config,
        } => run_standalone(port, data_dir, config).await,
    }
}

async fn run_standalone(
    port: u16,
    data_dir: PathBuf,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("Flotilla daemon starting in standalone mode");

    let config = match &config_path {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("flotilla.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = flotilla_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let executor = TaskExecutor::new(Arc::new(MockProvisioner::new()));
    info!("task executor initialized (mock provisioner)");

    let orchestrator = Orchestrator::new(
        store,
        executor,
        config.retry.clone(),
        config.task_timeout(),
    );
    info!(
        launch_attempts = config.retry.launch_attempts,
        converge_attempts = config.retry.converge_attempts,
        timeout_secs = config.converge_timeout_secs,
        "orchestrator initialized"
    );

    // ── Start API server ───────────────────────────────────────

    let router = flotilla_api::build_router(orchestrator);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install CTRL+C handler");
        }
        info!("shutdown signal received");
    });

    server.await?;

    info!("Flotilla daemon stopped");
    Ok(())
}
