//! iib-web
//!
//! HTTP API, dispatcher, and build driver for the index image builder. This
//! binary wires every collaborator the domain needs (database, inspect
//! cache, git host, artifact transport, pipeline client, catalog tool,
//! notification bus) into `AppState` and serves the API router; the worker
//! plane spawns its per-queue consumer tasks lazily, the first time a
//! request is dispatched to a queue that hasn't been seen yet.

use std::sync::Arc;

use anyhow::Result;
use iib_web::{
    api,
    cache::{InMemoryCacheBackend, InspectCache},
    cleanup::{CleanupWorker, CleanupWorkerConfig},
    config,
    db::Database,
    driver::{CatalogTool, ProcessCatalogTool},
    git::ProcessGitDriver,
    messaging::{NotificationSender, StompConnector},
    pipeline::{k8s::K8sPipelineClient, PipelineClientConfig},
    state::AppState,
    transport::ProcessArtifactTransport,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into());
    match config.log_format {
        config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        config::LogFormat::Plain => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!("Starting index image builder");
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    let db = match Database::connect(&config.database).await {
        Ok(db) => {
            info!("Database connection established");
            db
        }
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return Err(e.into());
        }
    };

    if config.dev_mode {
        info!("Running database migrations (dev mode)");
        if let Err(e) = db.run_migrations().await {
            error!(error = %e, "Failed to run migrations");
            return Err(e.into());
        }
    }

    let cache = InspectCache::new(Arc::new(InMemoryCacheBackend::default()), config.dogpile.expiration_time);

    let git: Arc<dyn iib_web::git::GitDriver> = Arc::new(ProcessGitDriver::new());
    let transport: Arc<dyn iib_web::transport::ArtifactTransport> = Arc::new(ProcessArtifactTransport::new());
    let catalog: Arc<dyn CatalogTool> = Arc::new(ProcessCatalogTool::new(Arc::new(cache.clone())));

    let pipeline_config = PipelineClientConfig {
        cluster_url: config.konflux.cluster_url.clone(),
        cluster_token: config.konflux.cluster_token.clone(),
        ca_cert: config.konflux.cluster_ca_cert.clone(),
        namespace: config.konflux.namespace.clone(),
        pipeline_timeout: config.konflux.pipeline_timeout,
        total_attempts: config.total_attempts,
        retry_multiplier: config.retry_multiplier,
    };
    let pipeline: Arc<dyn iib_web::pipeline::PipelineClient> = match K8sPipelineClient::new(pipeline_config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to build pipeline client");
            return Err(e.into());
        }
    };

    let notifier = Arc::new(NotificationSender::new(Arc::new(StompConnector::new()), config.messaging.urls.clone()));

    let state = AppState::new(config.clone(), db.clone(), cache, git, pipeline, transport, notifier, catalog);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cleanup_worker = CleanupWorker::new(
        db.pool().clone(),
        CleanupWorkerConfig {
            request_logs_dir: config.request_logs_dir.clone(),
            request_logs_days_to_live: config.request_logs_days_to_live,
            request_related_bundles_dir: config.request_related_bundles_dir.clone(),
            request_recursive_related_bundles_dir: config.request_recursive_related_bundles_dir.clone(),
            request_data_days_to_live: config.request_data_days_to_live,
            ..CleanupWorkerConfig::default()
        },
    );
    let cleanup_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            cleanup_worker.run(shutdown_rx).await;
        }
    });

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, cleanup_handle).await {
        warn!(error = %e, "Cleanup worker did not shut down in time");
    }

    info!("Index image builder shutdown complete");
    Ok(())
}
