use std::path::PathBuf;

use clap::Parser;
use montage::db::Database;
use montage::{
    apply_env_overrides, config::validate_config, load_config, ArtifactStore, Capabilities,
    Config, JobStore, MontageError, Orchestrator,
};
use montage_server::{routes, AppState};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info,montage=debug,montage_server=debug";

#[derive(Debug, Parser)]
#[command(name = "montage-server", version, about = "HTTP front end for montage jobs")]
struct Args {
    /// JSON config file. Defaults apply when omitted.
    #[arg(long, env = "MONTAGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum ServerError {
    #[error(transparent)]
    Montage(#[from] MontageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();
    init_tracing()?;

    let config = load(&args)?;
    tracing::info!(
        data_directory = %config.data_directory.display(),
        port = config.server.port,
        "Configuration loaded"
    );

    let orchestrator = bootstrap(&config).await?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let app = routes::router(AppState::new(orchestrator, config));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn load(args: &Args) -> montage::Result<Config> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let applied = apply_env_overrides(&mut config)?;
    if !applied.is_empty() {
        tracing::info!(overrides = ?applied, "Environment overrides applied");
    }
    validate_config(&config)?;
    Ok(config)
}

/// Opens the stores, wires the capabilities and recovers interrupted jobs.
async fn bootstrap(config: &Config) -> montage::Result<Orchestrator> {
    let db = Database::open(&config.database_path())?;
    let artifacts = ArtifactStore::new(config.artifact_directory())?;
    let capabilities = Capabilities::from_config(config)?;
    let orchestrator = Orchestrator::new(JobStore::new(db), artifacts, capabilities, config);

    let recovered = orchestrator.recover().await?;
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "Interrupted jobs marked as failed");
    }
    Ok(orchestrator)
}

/// `RUST_LOG` overrides the default filter. `LOG_FORMAT=json` switches to
/// JSON lines. `log` records from the library are bridged into tracing.
fn init_tracing() -> Result<(), ServerError> {
    tracing_log::LogTracer::init().map_err(|e| ServerError::Logging(e.to_string()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().json()),
        )
    } else {
        tracing::subscriber::set_global_default(registry.with(tracing_subscriber::fmt::layer()))
    };
    result.map_err(|e| ServerError::Logging(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
