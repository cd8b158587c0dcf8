//! analytics-gateway binary
//!
//! Starts the tool-server child, bridges HTTP/SSE clients onto its stdio,
//! and answers the platform's health probes. Exits non-zero when the child
//! cannot be started; exits zero on SIGTERM/ctrl-c after stopping the child.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use analytics_gateway::bridge::Bridge;
use analytics_gateway::config::Config;
use analytics_gateway::web::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = Config::parse();
    let (bridge, child) = Bridge::connect(&config)
        .await
        .context("failed to start tool server")?;

    let state = AppState::new(bridge, &config);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    web::serve_on(listener, state, shutdown_signal()).await?;

    child.shutdown().await;
    tracing::info!("gateway stopped");
    Ok(())
}

/// Logging to stderr; `LOG_FORMAT=json` switches to structured output for
/// log aggregation.
fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("analytics_gateway=info,tower_http=info"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
