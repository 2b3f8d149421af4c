//! audiod-vc - Volume & mode coordination daemon entry point
//!
//! Wires the persistence pool, event bus and engine task together, builds
//! the service boundary, and runs until a shutdown signal flushes pending
//! persistence.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiod_common::config::PlatformConfiguration;
use audiod_common::events::EventBus;
use audiod_vc::liveness::LivenessWatch;
use audiod_vc::native::LoggingBackend;
use audiod_vc::serializer::Command;
use audiod_vc::state::ServiceState;
use audiod_vc::{AudioService, VolumeEngine};

/// Command-line arguments for audiod-vc
#[derive(Parser, Debug)]
#[command(name = "audiod-vc")]
#[command(about = "Volume & mode coordination daemon")]
#[command(version)]
struct Args {
    /// SQLite database path for persisted volume state
    #[arg(short, long, default_value = "audiod.db", env = "AUDIOD_DB")]
    database: PathBuf,

    /// Optional platform configuration TOML (built-in tables when absent)
    #[arg(short, long, env = "AUDIOD_PLATFORM_CONFIG")]
    platform_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audiod_vc=debug,audiod_common=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match &args.platform_config {
        Some(path) => PlatformConfiguration::load(path)
            .with_context(|| format!("Failed to load platform config {}", path.display()))?,
        None => PlatformConfiguration::builtin(),
    };
    let config = Arc::new(config);
    info!("Platform configuration loaded (region {})", config.region);

    let db_url = format!("sqlite://{}?mode=rwc", args.database.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .context("Failed to open settings database")?;
    audiod_vc::db::init_database(&pool)
        .await
        .context("Failed to initialize settings database")?;

    let bus = Arc::new(EventBus::new(100));
    let state = Arc::new(ServiceState::new());
    let liveness = Arc::new(LivenessWatch::new());
    let backend = Arc::new(LoggingBackend);

    let engine = VolumeEngine::new(
        Arc::clone(&config),
        backend,
        pool,
        Arc::clone(&bus),
        Arc::clone(&state),
        Arc::clone(&liveness),
    )
    .await
    .context("Failed to initialize coordination engine")?;

    let handle = engine.handle();
    let _service = AudioService::new(
        config,
        engine.volumes(),
        handle.clone(),
        state,
        bus,
        liveness,
    );
    info!("Coordination engine initialized");

    let engine_task = tokio::spawn(engine.run());

    shutdown_signal().await;
    handle.post(Command::Shutdown);
    engine_task.await.context("Engine task panicked")?;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
