use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::rest::{self, AppState};
use crate::client::FluxClient;
use crate::config::LoadedConfig;
use crate::domain::automation::AutomationEngine;
use crate::logging::{redact, LogItem, Logger};

pub async fn run(loaded: LoadedConfig) -> Result<()> {
    let config = loaded.config;

    // Init tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "flux-sweeper daemon starting");

    let logger = Arc::new(Logger::new(&config.log_settings()));
    logger.record(
        "SYSTEM",
        &[format!("flux-sweeper {} starting.", env!("CARGO_PKG_VERSION")).into()],
    );
    match &loaded.source {
        Some(path) => logger.record("CONFIG", &[format!("Loaded {}", path.display()).into()]),
        None => logger.record("CONFIG", &["No config file, using defaults and environment.".into()]),
    }
    for warning in &loaded.warnings {
        warn!(%warning, "configuration adjusted");
        logger.record("CONFIG", &[warning.into()]);
    }
    logger.record_debug(
        "CONFIG",
        &["Effective settings:".into(), LogItem::Data(redact::redact_serializable(&config))],
    );

    // Create shared services
    let client = Arc::new(FluxClient::new(config.request_timeout(), logger.clone())?);
    let engine = Arc::new(AutomationEngine::new(
        client,
        logger.clone(),
        config.automation_settings(),
    ));
    engine.register_static(config.nodes.clone()).await;

    let scan_ips = Arc::new(config.scan_targets());
    let internet = Arc::new(AtomicBool::new(false));

    // Connectivity check (background)
    {
        let internet = internet.clone();
        let logger = logger.clone();
        let timeout = config.request_timeout();
        tokio::spawn(async move {
            let online = crate::net::has_internet(timeout).await;
            internet.store(online, Ordering::Relaxed);
            if online {
                logger.record("SYSTEM", &["Internet connection available.".into()]);
            } else {
                logger.record(
                    "SYSTEM",
                    &["No internet connection detected. Local nodes may still be reachable.".into()],
                );
            }
        });
    }

    // Spawn initial discovery (background, the API serves immediately)
    {
        let engine = engine.clone();
        let scan_ips = scan_ips.clone();
        tokio::spawn(async move {
            let set = engine.discover(&scan_ips).await;
            info!(
                nodes = set.nodes.len(),
                active = ?set.active_node_id,
                "initial discovery completed"
            );
        });
    }

    let app_state = AppState {
        engine: engine.clone(),
        logger: logger.clone(),
        scan_ips,
        internet,
        started: Instant::now(),
    };

    let app = rest::router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Bind HTTP listener
    let http_addr = &config.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, "HTTP server listening");

    // Run HTTP server with graceful shutdown
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    engine.shutdown().await;
    logger.record("SYSTEM", &["Shutting down.".into()]);
    logger.close();

    info!("flux-sweeper daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}
