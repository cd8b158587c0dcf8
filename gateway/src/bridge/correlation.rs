//! Pending-request table
//!
//! Maps gateway correlation ids to the completion handle of the session that
//! issued the request. Every entry leaves the table through exactly one of
//! `resolve` (response arrived), `cancel` (timeout or client disconnect), or
//! `fail_all` (child died), so the table stays bounded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use super::frame::{self, OriginalId};
use super::sink::ResponseSink;
use crate::error::GatewayError;

/// One in-flight tool invocation awaiting its correlated response.
pub struct Pending {
    sink: ResponseSink,
    session: Uuid,
    original_id: OriginalId,
    submitted_at: Instant,
}

impl Pending {
    pub fn new(sink: ResponseSink, session: Uuid, original_id: OriginalId) -> Self {
        Self {
            sink,
            session,
            original_id,
            submitted_at: Instant::now(),
        }
    }
}

/// Correlation table shared between request handlers and the child reader.
#[derive(Default)]
pub struct CorrelationTable {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Pending>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Pending>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh correlation id; never reused for the lifetime of the process.
    pub fn next_correlation_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register an in-flight request. At most one entry per correlation id.
    pub fn insert(&self, correlation_id: u64, pending: Pending) {
        let previous = self.entries().insert(correlation_id, pending);
        debug_assert!(previous.is_none(), "correlation id reused");
    }

    /// Route a correlated frame from the child back to its session.
    ///
    /// Restores the client's original `id`, delivers through the sink, and
    /// removes the entry. Returns false when no entry matched (the request
    /// already timed out, was cancelled, or the id is not ours).
    pub fn resolve(&self, correlation_id: u64, mut response: Value) -> bool {
        let Some(pending) = self.entries().remove(&correlation_id) else {
            return false;
        };

        frame::restore(&mut response, &pending.original_id);
        let elapsed = pending.submitted_at.elapsed();
        if pending.sink.deliver(Ok(response)) {
            tracing::debug!(
                correlation_id,
                session = %pending.session,
                elapsed_ms = elapsed.as_millis() as u64,
                "response routed"
            );
        } else {
            tracing::debug!(
                correlation_id,
                session = %pending.session,
                "session disconnected before its response arrived"
            );
        }
        true
    }

    /// Drop an entry without delivering anything. Idempotent.
    pub fn cancel(&self, correlation_id: u64) -> bool {
        self.entries().remove(&correlation_id).is_some()
    }

    /// Fail every in-flight request; used when the child process dies.
    pub fn fail_all(&self) {
        let drained: Vec<Pending> = {
            let mut entries = self.entries();
            entries.drain().map(|(_, pending)| pending).collect()
        };
        if drained.is_empty() {
            return;
        }
        tracing::warn!(count = drained.len(), "failing in-flight requests");
        for pending in drained {
            pending.sink.deliver(Err(GatewayError::ChildUnavailable));
        }
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Guard that cancels the entry when dropped, unless it was resolved
    /// first. Covers clients that disconnect mid-request.
    pub fn guard(self: &Arc<Self>, correlation_id: u64) -> PendingGuard {
        PendingGuard {
            table: Arc::clone(self),
            correlation_id,
        }
    }
}

/// Drop guard tying a pending entry to its request handler or SSE stream.
pub struct PendingGuard {
    table: Arc<CorrelationTable>,
    correlation_id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.table.cancel(self.correlation_id) {
            tracing::debug!(
                correlation_id = self.correlation_id,
                "pending request reclaimed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Delivery;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn buffered() -> (ResponseSink, oneshot::Receiver<Delivery>) {
        let (tx, rx) = oneshot::channel();
        (ResponseSink::Buffered(tx), rx)
    }

    #[tokio::test]
    async fn resolve_restores_original_id_and_removes_entry() {
        let table = CorrelationTable::new();
        let (sink, rx) = buffered();
        table.insert(
            9,
            Pending::new(sink, Uuid::new_v4(), OriginalId::Present(json!("client-1"))),
        );

        assert!(table.resolve(9, json!({"result": 1, "id": 9})));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"result": 1, "id": "client-1"}));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn resolve_unknown_id_is_a_no_op() {
        let table = CorrelationTable::new();
        assert!(!table.resolve(1, json!({"id": 1})));
    }

    #[tokio::test]
    async fn fail_all_delivers_unavailable() {
        let table = CorrelationTable::new();
        let (sink, rx) = buffered();
        table.insert(3, Pending::new(sink, Uuid::new_v4(), OriginalId::Absent));

        table.fail_all();
        assert!(matches!(
            rx.await.unwrap(),
            Err(GatewayError::ChildUnavailable)
        ));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn guard_cancels_on_drop() {
        let table = Arc::new(CorrelationTable::new());
        let (sink, _rx) = buffered();
        table.insert(5, Pending::new(sink, Uuid::new_v4(), OriginalId::Absent));

        {
            let _guard = table.guard(5);
        }
        assert!(table.is_empty());

        // Idempotent once resolved elsewhere.
        let guard = table.guard(5);
        drop(guard);
        assert!(table.is_empty());
    }

    #[test]
    fn correlation_ids_are_unique() {
        let table = CorrelationTable::new();
        let a = table.next_correlation_id();
        let b = table.next_correlation_id();
        assert_ne!(a, b);
    }
}
