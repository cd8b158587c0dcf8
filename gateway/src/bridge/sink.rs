//! Response-sink capability
//!
//! A pending request completes through exactly one of two sink shapes:
//! buffered (complete once, plain HTTP response) or streaming (append to an
//! SSE channel). Handlers pick the shape; the correlation table delivers
//! through it without branching on the transport.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::GatewayError;

/// What a sink receives: the correlated frame, or a request-scoped error.
pub type Delivery = Result<Value, GatewayError>;

/// Where a correlated response goes.
pub enum ResponseSink {
    /// Complete once with the response (buffered request/response mode).
    Buffered(oneshot::Sender<Delivery>),
    /// Append for streaming delivery (SSE mode).
    Streaming(mpsc::Sender<Delivery>),
}

impl ResponseSink {
    /// Deliver to the owning session. Returns false if the receiver is gone
    /// (client disconnected); the delivery is dropped in that case.
    pub fn deliver(self, delivery: Delivery) -> bool {
        match self {
            ResponseSink::Buffered(tx) => tx.send(delivery).is_ok(),
            ResponseSink::Streaming(tx) => tx.try_send(delivery).is_ok(),
        }
    }
}
