//! Process entry point: loads configuration, wires the store/auth/trigger
//! handles once at startup, and serves the HTTP surface (spec §4.8, §5
//! "a process-wide store client handle, created once, reused").

mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use scheduler_auth::AuthGate;
use scheduler_config::SchedulerConfig;
use scheduler_store::{FileStore, InMemoryStore, StoreGateway};
use scheduler_webhook::TriggerClient;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use routes::AppState;

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("SCHEDULER_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("scheduler.toml"));
    let config = SchedulerConfig::load(&config_path).context("loading configuration")?;
    config.validate().context("validating configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let store: Arc<dyn StoreGateway> = match &config.store_base_dir {
        Some(dir) => Arc::new(FileStore::new(PathBuf::from(dir))),
        None => Arc::new(InMemoryStore::new()),
    };

    let state = Arc::new(AppState {
        store,
        trigger: TriggerClient::new(config.execution.clone()),
        auth: AuthGate::new(config.auth.clone().into()),
        retry: config.retry.clone(),
    });

    let app = routes::build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(CatchPanicLayer::new());

    let listen_addr = std::env::var("SCHEDULER_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;

    tracing::info!(service_name = %config.service_name, listen_addr = %listen_addr, "scheduler listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
