//! SaccharumVision - Main Entry Point
//!
//! Serves the leaf disease classifier over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use saccharum_vision::{
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, PredictionMetrics},
    models::ModelRegistry,
    server::{self, AppState},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "saccharum-vision", version, about = "Sugar cane leaf disease classification service")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "SACCHARUM_CONFIG", default_value = "config/config.toml")]
    config: PathBuf,

    /// Bind address (overrides the configuration file)
    #[arg(long)]
    host: Option<String>,

    /// Port (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "saccharum_vision={level},tower_http={level}",
            level = logging.level
        ))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from_path(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_logging(&config.logging)?;

    info!("Starting SaccharumVision");
    info!(
        threshold = config.prediction.threshold,
        tta_augmentations = config.prediction.tta_augmentations,
        default_model = %config.models.default_model,
        "Configuration loaded"
    );

    for problem in config.validate() {
        warn!("{}", problem);
    }

    let registry = ModelRegistry::new(&config.models).context("Failed to initialize ONNX Runtime")?;
    let metrics = Arc::new(PredictionMetrics::new());

    let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
    tokio::spawn(reporter.start());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::with_metrics(config, registry, metrics.clone());

    // Warm up the default model; failure only means the first request retries
    let warm_registry = state.registry.clone();
    let default_model = warm_registry.default_model().to_string();
    match tokio::task::spawn_blocking(move || warm_registry.get(&default_model)).await? {
        Ok(classifier) => info!(model = %classifier.name(), "Default model ready"),
        Err(e) => error!(error = %e, "Default model could not be loaded"),
    }

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");
    metrics.print_summary();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
