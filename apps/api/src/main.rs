mod config;
mod errors;
mod guidance;
mod llm_client;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::guidance::clock::SystemClock;
use crate::guidance::service::GuidanceService;
use crate::guidance::store::{BundleStore, BundleStoreConfig};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Glixtron API v{}", env!("CARGO_PKG_VERSION"));

    if !config.ai_configured() {
        info!("DEEPSEEK_API_KEY not set; guidance requests will fail until it is configured");
    }

    // Initialize bundle store and its expiry tick
    let bundles = Arc::new(BundleStore::new(
        BundleStoreConfig {
            ttl: config.bundle_ttl,
            max_bundles: config.max_bundles,
        },
        Arc::new(SystemClock),
    )?);
    bundles.spawn_reaper(config.sweep_interval);
    info!(
        "Bundle store initialized (ttl: {}s, capacity: {}, sweep every {}s)",
        config.bundle_ttl.as_secs(),
        config.max_bundles,
        config.sweep_interval.as_secs()
    );

    // Initialize LLM client
    let llm = LlmClient::new(config.llm_timeout)?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let guidance = Arc::new(GuidanceService::new(
        bundles.clone(),
        Arc::new(llm),
        config.deepseek_api_key.clone(),
    ));

    // Build app state
    let state = AppState {
        config: config.clone(),
        bundles: bundles.clone(),
        guidance,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web frontend's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bundles.shutdown();
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
