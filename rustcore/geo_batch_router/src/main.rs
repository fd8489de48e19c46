//! Batch routing engine service.
//!
//! Ingests an uploaded tabular file of origin/destination coordinate
//! pairs, reprojects them to WGS84, dispatches bounded-concurrency route
//! queries against an external OSRM-compatible daemon, and streams the
//! resulting road geometries into a persistent GeoJSON document while
//! publishing live progress over HTTP and WebSocket.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geo_batch_router::config::Config;
use geo_batch_router::http;

#[derive(Parser, Debug)]
#[command(name = "geo_batch_router")]
#[command(about = "Batch routing engine: coordinates in, routed road geometries out")]
struct Args {
    /// Overrides `OSRM_URL` for this run.
    #[arg(long, env = "OSRM_URL")]
    osrm_url: Option<String>,

    /// Overrides `PORT` for this run.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Tracing verbosity, also settable via `RUST_LOG`.
    #[arg(short = 'l', long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!("starting geo_batch_router v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load().context("loading configuration")?;
    if let Some(osrm_url) = args.osrm_url {
        config.osrm_url = osrm_url;
    }
    if let Some(port) = args.port {
        config.bind_addr.set_port(port);
    }
    config.ensure_directories().await.context("preparing data directories")?;

    let bind_addr = config.bind_addr;
    let eviction_interval = config.file_cleanup_interval;

    let state = http::state::AppState::new(config);
    state.registry.spawn_eviction_loop(eviction_interval);
    let registry = state.registry.clone();

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;

    info!(%bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .context("server loop exited with an error")?;

    info!("shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then cancels every non-terminal job before
/// letting `axum::serve`'s graceful shutdown drain in-flight connections
/// (`spec.md` §5: "on graceful shutdown cancels every non-terminal job").
async fn shutdown_signal(registry: std::sync::Arc<geo_batch_router::registry::Registry>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
    registry.cancel_all_non_terminal();
}
