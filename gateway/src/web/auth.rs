//! Bearer-token authorization for the stream path
//!
//! Applied only to the stream routes: the platform's health prober hits
//! `/ping` without credentials. When no API key is configured all requests
//! pass. A rejected request never reaches the bridge, so nothing is written
//! to the child.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use super::state::AppState;
use crate::error::GatewayError;

/// Middleware enforcing `Authorization: Bearer <key>` on the stream path.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let Some(expected) = state.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if token_matches(header, expected) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(path = %request.uri().path(), "rejected unauthorized request");
        Err(GatewayError::Unauthorized)
    }
}

fn token_matches(header: Option<&str>, expected: &str) -> bool {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}
