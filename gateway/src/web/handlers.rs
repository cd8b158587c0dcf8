//! Stream-path and health handlers

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::Stream;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use super::state::AppState;
use crate::bridge::ResponseSink;
use crate::error::GatewayError;

/// Queue depth for a single SSE response stream.
const STREAM_QUEUE: usize = 8;

/// Queue depth for a long-lived notification session.
const SESSION_QUEUE: usize = 32;

/// Liveness probe. 204 while the child runs, 503 once it has exited so the
/// platform restarts the container.
pub async fn ping(State(state): State<AppState>) -> StatusCode {
    if state.bridge.is_child_alive() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// One tool invocation. Buffered request/response by default; clients that
/// accept `text/event-stream` get the correlated response as an SSE event.
pub async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let frame: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
    let session = Uuid::new_v4();

    if wants_event_stream(&headers) {
        invoke_streaming(state, frame, session)
            .await
            .map(IntoResponse::into_response)
    } else {
        invoke_buffered(state, frame, session)
            .await
            .map(IntoResponse::into_response)
    }
}

async fn invoke_buffered(
    state: AppState,
    frame: Value,
    session: Uuid,
) -> Result<Json<Value>, GatewayError> {
    let (tx, rx) = oneshot::channel();
    let correlation_id = state
        .bridge
        .dispatch(frame, ResponseSink::Buffered(tx), session)
        .await?;
    // Reclaims the pending entry if the client disconnects mid-request.
    let _guard = state.bridge.table().guard(correlation_id);

    let timeout = state.bridge.response_timeout();
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(Ok(response))) => Ok(Json(response)),
        Ok(Ok(Err(err))) => Err(err),
        // Sink dropped without a delivery: the child died mid-request.
        Ok(Err(_)) => Err(GatewayError::ChildUnavailable),
        Err(_) => Err(GatewayError::ResponseTimeout { timeout }),
    }
}

async fn invoke_streaming(
    state: AppState,
    frame: Value,
    session: Uuid,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    let (tx, rx) = mpsc::channel(STREAM_QUEUE);
    let correlation_id = state
        .bridge
        .dispatch(frame, ResponseSink::Streaming(tx), session)
        .await?;
    let guard = state.bridge.table().guard(correlation_id);

    let timeout = state.bridge.response_timeout();
    let stream = ReceiverStream::new(rx)
        .timeout(timeout)
        .take(1)
        .map(move |item| {
            // Holding the guard inside the stream ties the pending entry's
            // lifetime to the SSE connection, not to the handler future.
            let _keep = &guard;
            let event = match item {
                Ok(Ok(response)) => Event::default().data(response.to_string()),
                Ok(Err(err)) => error_event(&err),
                Err(_elapsed) => error_event(&GatewayError::ResponseTimeout { timeout }),
            };
            Ok::<_, Infallible>(event)
        });

    Ok(Sse::new(stream))
}

/// Long-lived notification stream: server-initiated frames from the child
/// are fanned out to every open session.
pub async fn subscribe(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    if !state.bridge.is_child_alive() {
        return Err(GatewayError::ChildUnavailable);
    }

    let (guard, rx) = state.bridge.sessions().register(SESSION_QUEUE);
    tracing::info!(session = %guard.id(), "sse session opened");

    let stream = ReceiverStream::new(rx).map(move |frame| {
        let _keep = &guard;
        Ok::<_, Infallible>(Event::default().data(frame.to_string()))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

fn error_event(err: &GatewayError) -> Event {
    Event::default()
        .event("error")
        .data(serde_json::json!({ "error": err.to_string() }).to_string())
}
