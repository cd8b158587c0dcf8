//! HTTP surface of the gateway
//!
//! Two routes: the configurable stream path (POST for tool invocations, GET
//! for a long-lived notification stream) behind optional bearer auth, and
//! the fixed `/ping` liveness probe used by the hosting platform.

pub mod auth;
pub mod handlers;
pub mod state;

use anyhow::Result;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the router for the given state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let stream_routes = Router::new()
        .route(
            &state.stream_path,
            post(handlers::invoke).get(handlers::subscribe),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .merge(stream_routes)
        .route("/ping", get(handlers::ping))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    tracing::info!(
        addr = %listener.local_addr()?,
        stream_path = %state.stream_path,
        auth = state.api_key.is_some(),
        "gateway listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
