//! Protocol bridge between HTTP sessions and the child's stdio
//!
//! Many concurrent sessions, one child. Each inbound frame is stamped with a
//! fresh correlation id, registered in the pending table, and queued to the
//! single stdin writer; the single stdout reader routes correlated frames
//! back through the registered sink and fans un-correlated frames out to
//! open SSE sessions. The child's pipes are never touched from more than one
//! task.

mod correlation;
mod frame;
mod sessions;
mod sink;

pub use correlation::{CorrelationTable, Pending, PendingGuard};
pub use frame::OriginalId;
pub use sessions::{SessionGuard, SessionRegistry};
pub use sink::{Delivery, ResponseSink};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::child::ChildHandle;
use crate::config::Config;
use crate::error::GatewayError;

/// Shared bridge handed to every request handler.
#[derive(Clone)]
pub struct Bridge {
    outbound: mpsc::Sender<String>,
    table: Arc<CorrelationTable>,
    sessions: Arc<SessionRegistry>,
    child_alive: Arc<AtomicBool>,
    response_timeout: Duration,
}

impl Bridge {
    /// Spawn the configured child and wire the bridge to its pipes.
    ///
    /// Fatal on spawn failure or instant child exit; the caller is expected
    /// to exit non-zero.
    pub async fn connect(config: &Config) -> Result<(Bridge, ChildHandle), GatewayError> {
        let table = Arc::new(CorrelationTable::new());
        let sessions = Arc::new(SessionRegistry::new());
        let spec = config.child_spec()?;

        let child = ChildHandle::spawn(
            &spec,
            config.startup_timeout(),
            Arc::clone(&table),
            Arc::clone(&sessions),
        )
        .await?;

        let bridge = Bridge {
            outbound: child.outbound(),
            table,
            sessions,
            child_alive: child.liveness(),
            response_timeout: config.response_timeout(),
        };
        Ok((bridge, child))
    }

    /// Whether the supervised child is currently running.
    pub fn is_child_alive(&self) -> bool {
        self.child_alive.load(Ordering::SeqCst)
    }

    pub fn table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Validate, stamp, register, and enqueue one frame to the child.
    ///
    /// Nothing reaches the child for malformed payloads, and a dead child
    /// refuses the request up front. Returns the correlation id under which
    /// the response will be routed to `sink`.
    pub async fn dispatch(
        &self,
        frame: Value,
        sink: ResponseSink,
        session: Uuid,
    ) -> Result<u64, GatewayError> {
        if !self.is_child_alive() {
            return Err(GatewayError::ChildUnavailable);
        }

        let Value::Object(mut object) = frame else {
            return Err(GatewayError::MalformedPayload(
                "request body must be a JSON object".into(),
            ));
        };

        let correlation_id = self.table.next_correlation_id();
        let original_id = frame::stamp(&mut object, correlation_id);
        let line = serde_json::to_string(&Value::Object(object))
            .map_err(|e| GatewayError::ChildProtocol(format!("unserializable frame: {e}")))?;

        self.table
            .insert(correlation_id, Pending::new(sink, session, original_id));

        if self.outbound.send(line).await.is_err() {
            // Writer task is gone: the child's stdin is closed.
            self.table.cancel(correlation_id);
            return Err(GatewayError::ChildUnavailable);
        }

        tracing::debug!(correlation_id, session = %session, "frame dispatched");
        Ok(correlation_id)
    }
}

/// Route one stdout line from the child.
///
/// Frames carrying a known correlation id complete their pending request;
/// id-less frames are server-initiated and broadcast to SSE sessions;
/// anything else is logged and dropped so a misbehaving child cannot poison
/// other sessions.
pub(crate) fn route_line(line: &str, table: &CorrelationTable, sessions: &SessionRegistry) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let frame: Value = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed frame from tool server");
            return;
        }
    };

    match frame.get("id").and_then(Value::as_u64) {
        Some(correlation_id) => {
            if !table.resolve(correlation_id, frame) {
                tracing::debug!(correlation_id, "no pending request for correlated frame");
            }
        }
        None => sessions.broadcast(frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn route_line_resolves_pending_request() {
        let table = CorrelationTable::new();
        let sessions = SessionRegistry::new();
        let (tx, rx) = oneshot::channel();
        table.insert(
            0,
            Pending::new(ResponseSink::Buffered(tx), Uuid::new_v4(), OriginalId::Absent),
        );

        route_line(r#"{"result":"ok","id":0}"#, &table, &sessions);
        assert_eq!(rx.await.unwrap().unwrap(), json!({"result": "ok"}));
    }

    #[tokio::test]
    async fn route_line_broadcasts_idless_frames() {
        let table = CorrelationTable::new();
        let sessions = Arc::new(SessionRegistry::new());
        let (_guard, mut rx) = sessions.register(4);

        route_line(r#"{"method":"notifications/progress"}"#, &table, &sessions);
        assert_eq!(
            rx.recv().await.unwrap(),
            json!({"method": "notifications/progress"})
        );
    }

    #[tokio::test]
    async fn route_line_survives_garbage() {
        let table = CorrelationTable::new();
        let sessions = SessionRegistry::new();
        route_line("not json at all", &table, &sessions);
        route_line("", &table, &sessions);
        route_line(r#"{"id": 99, "stray": true}"#, &table, &sessions);
    }
}
