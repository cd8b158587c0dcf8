//! Error taxonomy for the gateway
//!
//! Startup errors are fatal and surface as a non-zero process exit.
//! Everything else is request-scoped: it is mapped to an HTTP status for the
//! affected session and never crosses session boundaries.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the supervisor/proxy.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The configured child executable could not be launched.
    #[error("failed to launch tool server `{program}`: {source}")]
    ChildSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child launched but exited before the startup probe completed.
    #[error("tool server `{program}` exited during startup ({status})")]
    ChildStartup { program: String, status: ExitStatus },

    /// A child pipe could not be acquired or broke unexpectedly.
    #[error("tool server pipe unavailable: {0}")]
    ChildIo(&'static str),

    /// The child process is not running; the gateway is unhealthy.
    #[error("tool server is not available")]
    ChildUnavailable,

    /// The inbound payload was not a usable tool-protocol frame.
    #[error("malformed request payload: {0}")]
    MalformedPayload(String),

    /// Bearer token missing or mismatched.
    #[error("missing or invalid bearer token")]
    Unauthorized,

    /// No correlated response arrived within the configured window.
    #[error("no response from tool server within {}s", timeout.as_secs())]
    ResponseTimeout { timeout: Duration },

    /// The child broke the tool protocol for this request.
    #[error("tool server protocol error: {0}")]
    ChildProtocol(String),

    /// Invalid startup configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// HTTP status this error maps to when it reaches a client.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::ChildUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ResponseTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ChildProtocol(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ChildSpawn { .. }
            | GatewayError::ChildStartup { .. }
            | GatewayError::ChildIo(_)
            | GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
