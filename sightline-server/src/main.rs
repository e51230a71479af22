// Sightline detection server

use anyhow::Context;
use clap::Parser;
use sightline_core::SightlineConfig;
use sightline_server::archive::{GcsArchive, ObjectArchive};
use sightline_server::auth::GoogleAuth;
use sightline_server::detector::GoogleVisionDetector;
use sightline_server::history::{build_history_store, HistoryStore};
use sightline_server::{create_router, ApiState, DetectionIngestor};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sightline-server", version, about = "Object detection ingestion server")]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Listening port, overrides configuration and PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address, overrides configuration and HOST
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = SightlineConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.bind_address = host;
    }
    config.validate()?;

    init_tracing(&config);

    info!("Starting Sightline server ({:?})", config.server.environment);

    tokio::fs::create_dir_all(&config.server.upload_dir)
        .await
        .with_context(|| format!("creating upload dir {}", config.server.upload_dir.display()))?;

    let auth = Arc::new(GoogleAuth::from_config(&config.google)?);
    info!("Google Cloud credentials: {}", auth.describe());

    let detector = Arc::new(GoogleVisionDetector::new(&config.vision, &config.google, auth.clone())?);
    if !detector.has_credentials() {
        warn!("No Google credentials configured; detection requests will fail");
    }

    let archive: Option<Arc<dyn ObjectArchive>> = match GcsArchive::from_config(&config.archive, auth.clone())? {
        Some(archive) => {
            info!("Archiving uploads to bucket {}", archive.bucket());
            let archive: Arc<dyn ObjectArchive> = Arc::new(archive);
            Some(archive)
        }
        None => {
            info!("No storage bucket configured; archival disabled");
            None
        }
    };

    let history = build_history_store(&config.history, &config.google, auth)?;
    probe_history(history.as_ref(), &config.history.collection).await;

    let ingestor = DetectionIngestor::new(detector, archive, history.clone());
    let state = ApiState {
        ingestor: Arc::new(ingestor),
        history,
        upload_dir: Arc::new(config.server.upload_dir.clone()),
        max_upload_bytes: config.server.max_upload_bytes,
        environment: config.server.environment,
    };
    let app = create_router(state);

    let bind = (config.server.bind_address.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}:{}", bind.0, bind.1))?;
    let addr = listener.local_addr()?;

    info!("HTTP server listening on http://{}", addr);
    info!("Detect endpoint: http://{}/api/vision/detect", addr);
    info!("Health check: http://{}/api/vision/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &SightlineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// One reachability check at startup; requests handle failures themselves.
async fn probe_history(history: &dyn HistoryStore, collection: &str) {
    match history.ping().await {
        Ok(()) => info!("Connected to {} history store (collection '{}')", history.name(), collection),
        Err(e) => warn!("History store {} unreachable: {}", history.name(), e),
    }
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
