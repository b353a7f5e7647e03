//! Binary entry point: load config, bootstrap shared state, serve the
//! router with graceful shutdown on SIGINT/SIGTERM (§3 "Runtime").

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use vmgate_server::config::Config;
use vmgate_server::state::AppState;
use vmgate_server::routes;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("loading configuration")?;
    let bind_addr: SocketAddr = config.bind_addr.parse().context("parsing BIND_ADDR")?;

    let state = AppState::bootstrap(config).context("bootstrapping application state")?;
    tracing::info!(addr = %bind_addr, "vmgate-server starting");

    let router = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server exited with error")?;

    Ok(())
}

/// `RISK_DEBUG=1` additionally turns on debug-level logging for the risk
/// scorer's own target, without touching the global filter level.
fn init_tracing() {
    let risk_debug = std::env::var("RISK_DEBUG").map(|v| v == "1").unwrap_or(false);
    let default_directive = if risk_debug {
        "info,vmgate_risk=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt().with_env_filter(filter).init();
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}
