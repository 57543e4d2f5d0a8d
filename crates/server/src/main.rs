use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genloom_core::{
    create_usage_log, load_config, validate_config, ArtifactCache, HttpResourceFetcher,
    PipelineOrchestrator, ProviderRegistry, SqliteTaskStore, SqliteUploadRecordStore,
    SqliteUsageStore, TaskStore, UploadRecordStore, UsageEvent, UsageStore,
};

use genloom_server::{create_router, AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the usage event channel
const USAGE_BUFFER_SIZE: usize = 1000;

/// How long shutdown waits for queued usage events to be written
const USAGE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("GENLOOM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        providers = config.providers.len(),
        database = ?config.database.path,
        "Configuration loaded"
    );

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // All stores share one SQLite file
    let task_store: Arc<dyn TaskStore> = Arc::new(
        SqliteTaskStore::new(&config.database.path).context("Failed to create task store")?,
    );
    let upload_records: Arc<dyn UploadRecordStore> = Arc::new(
        SqliteUploadRecordStore::new(&config.database.path)
            .context("Failed to create upload record store")?,
    );
    let usage_store: Arc<dyn UsageStore> = Arc::new(
        SqliteUsageStore::new(&config.database.path).context("Failed to create usage store")?,
    );
    info!("Stores initialized");

    let (usage_handle, usage_writer) =
        create_usage_log(Arc::clone(&usage_store), USAGE_BUFFER_SIZE);
    let writer_handle = tokio::spawn(usage_writer.run());

    usage_handle
        .emit(UsageEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    let registry = ProviderRegistry::from_configs(
        &config.providers,
        config.credentials.user_id.as_deref(),
        Some(usage_handle.clone()),
    )
    .context("Failed to build provider adapters")?;

    let fetcher = Arc::new(HttpResourceFetcher::new(config.cache.resources_dir.clone()));
    let cache = ArtifactCache::new(fetcher).with_usage(usage_handle.clone());

    let orchestrator = PipelineOrchestrator::new(
        config.orchestrator.clone(),
        task_store,
        registry,
        cache,
    )
    .with_upload_records(upload_records)
    .with_usage(usage_handle.clone());
    info!(session = orchestrator.session_id(), "Pipeline orchestrator ready");

    if config.orchestrator.resume_on_start {
        match orchestrator.resume_all().await {
            Ok(handles) => info!(resumed = handles.len(), "Resumed in-progress stages"),
            Err(e) => error!(error = %e, "Failed to resume in-progress stages"),
        }
    }

    let state = Arc::new(AppState::new(
        config.clone(),
        orchestrator,
        Arc::clone(&usage_store),
    ));

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    usage_handle
        .emit(UsageEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;
    drop(usage_handle);

    // Polling loops still in flight hold usage handles; their records stay
    // in progress and are resumed on the next start.
    match tokio::time::timeout(USAGE_DRAIN_TIMEOUT, writer_handle).await {
        Ok(Ok(summary)) => info!(
            stored = summary.stored,
            failed = summary.failed,
            "Usage writer stopped"
        ),
        Ok(Err(e)) => error!(error = %e, "Usage writer task panicked"),
        Err(_) => warn!("Usage writer still busy at shutdown, in-flight stages will resume on restart"),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
