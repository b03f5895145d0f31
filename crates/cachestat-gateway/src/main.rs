//! cachestat gateway
//!
//! - Reads `CACHESTAT_CONFIG` (default `cachestat.yaml`)
//! - Runs the startup passes and worker init for the shared counters
//! - Serves lookup intake and ops endpoints until Ctrl-C
//! - Releases the shared block on the way out

use tracing_subscriber::{fmt, EnvFilter};

use cachestat_core::error::{CacheStatError, Result};
use cachestat_gateway::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, severity = e.severity().as_str(), "cachestat-gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = config::config_path();
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.server.listen_addr()?;

    let state = app_state::AppState::boot(cfg)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config = %path, "cachestat-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| CacheStatError::Internal(format!("bind {listen}: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CacheStatError::Internal(format!("server failed: {e}")));

    // Release the block even if serving failed.
    let released = state.shutdown();
    served?;
    released
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable; shutting down");
    }
    tracing::info!("shutdown requested");
}
