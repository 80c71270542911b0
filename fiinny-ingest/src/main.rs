//! fiinny-ingest - Transaction ingestion service
//!
//! Receives "ingest job created" events over HTTP, categorizes each raw
//! transaction through the classification oracle (or keyword heuristics),
//! and patches the result onto the user's expense or income record.
//!
//! `process` replays a single stored job by path, for manual redelivery.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use fiinny_common::config::{self, TomlConfig};
use fiinny_ingest::db::{DocPath, DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
use fiinny_ingest::services::{IngestEvent, IngestPipeline, PipelineSettings};
use fiinny_ingest::AppState;

/// Command-line arguments for fiinny-ingest
#[derive(Parser, Debug)]
#[command(name = "fiinny-ingest")]
#[command(about = "Transaction ingestion and categorization service")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = config::CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Classification oracle endpoint
    #[arg(long, global = true, env = config::ORACLE_URL_ENV)]
    oracle_url: Option<String>,

    /// SQLite database file
    #[arg(long, global = true, env = config::DATABASE_PATH_ENV)]
    database: Option<PathBuf>,

    /// Keep documents in memory only (nothing persists across restarts)
    #[arg(long, global = true, env = "FIINNY_EPHEMERAL")]
    ephemeral: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP trigger surface (default)
    Serve {
        /// Address to listen on
        #[arg(short, long, env = config::BIND_ENV)]
        bind: Option<String>,
    },
    /// Run the pipeline once for a stored job
    Process {
        /// Job document path, e.g. users/{uid}/ingest_jobs/{txKey}
        #[arg(long)]
        job_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = TomlConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = &cli.oracle_url {
        config.oracle.endpoint = Some(url.clone());
    }
    if let Some(path) = &cli.database {
        config.database_path = Some(path.clone());
    }
    if let Some(Command::Serve { bind: Some(bind) }) = &cli.command {
        config.server.bind = bind.clone();
    }
    config.validate().context("Invalid configuration")?;

    fiinny_common::logging::init_tracing(&config.logging)
        .context("Failed to initialize logging")?;

    info!("Starting fiinny-ingest (Transaction Ingestion)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn DocumentStore> = if cli.ephemeral {
        warn!("Ephemeral mode: documents are kept in memory only");
        Arc::new(MemoryDocumentStore::new())
    } else {
        let db_path = config.database_path();
        info!("Database: {}", db_path.display());
        Arc::new(
            SqliteDocumentStore::connect(&db_path)
                .await
                .context("Failed to open document store")?,
        )
    };

    let classifier = fiinny_ingest::build_classifier(&config.oracle)
        .context("Failed to initialize classifier")?;
    let pipeline = Arc::new(IngestPipeline::new(
        store,
        classifier,
        PipelineSettings::from_config(&config),
    ));

    match cli.command {
        Some(Command::Process { job_path }) => process_one(&pipeline, &job_path).await,
        Some(Command::Serve { .. }) | None => serve(pipeline, &config.server.bind).await,
    }
}

async fn serve(pipeline: Arc<IngestPipeline>, bind: &str) -> Result<()> {
    let state = AppState::new(pipeline);
    let app = fiinny_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn process_one(pipeline: &IngestPipeline, job_path: &str) -> Result<()> {
    let job_path = DocPath::parse(job_path).context("Invalid job path")?;
    let event = IngestEvent::from_path(job_path, None).context("Job path has no owner")?;
    let delivery = pipeline.handle(event).await?;

    println!(
        "outcome={} status={}",
        delivery.outcome.as_str(),
        delivery.status
    );
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
