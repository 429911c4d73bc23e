//! Algo Cache - administrative server for the algorithm cache
//!
//! Serves health, statistics and invalidation endpoints over the cache facade.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use algo_cache::{create_router, spawn_sweep_task, AppState, Config};

/// Main entry point for the cache admin server.
///
/// # Startup Sequence
/// 1. Load `.env` and initialize the tracing subscriber
/// 2. Load and validate configuration
/// 3. Build the cache facade and connect the primary store
/// 4. Start the fallback sweep task
/// 5. Serve the admin router until SIGINT/SIGTERM
/// 6. Stop the sweep task and disconnect the primary store
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "algo_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Algo Cache server");

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        "Configuration loaded: redis={}:{}/{}, prefix={}, fallback_max_entries={}, sweep_interval={}s, port={}",
        config.redis_host,
        config.redis_port,
        config.redis_db,
        config.key_prefix,
        config.fallback_max_entries,
        config.sweep_interval_secs,
        config.server_port
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to initialize cache")?;
    info!("Cache facade initialized: {:?}", state.cache);

    let sweep_handle = spawn_sweep_task(state.cache.fallback(), config.sweep_interval());
    info!("Fallback sweep task started");

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweep_handle))
        .await
        .context("server error")?;

    state.cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the sweep task.
async fn shutdown_signal(sweep_handle: tokio::task::JoinHandle<()>) {
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    sweep_handle.abort();
    warn!("Fallback sweep task aborted");
}
