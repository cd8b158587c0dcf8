//! Long-lived SSE session registry
//!
//! Server-initiated frames (no `id` member) cannot be correlated to a
//! pending request; they are fanned out to every open notification stream.
//! Registration lives exactly as long as the client's SSE connection: the
//! guard deregisters on drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Open notification streams keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    streams: Mutex<HashMap<Uuid, mpsc::Sender<Value>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<Uuid, mpsc::Sender<Value>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a notification stream; dropping the guard closes it.
    pub fn register(self: &Arc<Self>, capacity: usize) -> (SessionGuard, mpsc::Receiver<Value>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity);
        self.streams().insert(id, tx);
        (
            SessionGuard {
                registry: Arc::clone(self),
                id,
            },
            rx,
        )
    }

    /// Fan a server-initiated frame out to every open stream.
    ///
    /// Streams whose client has disconnected are pruned here; slow consumers
    /// drop the frame rather than block the child reader.
    pub fn broadcast(&self, frame: Value) {
        self.streams().retain(|id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session = %id, "slow sse session, dropping notification");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    /// Number of open notification streams.
    pub fn len(&self) -> usize {
        self.streams().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: Uuid) {
        self.streams().remove(&id);
    }
}

/// Keeps a notification stream registered while the SSE response is alive.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: Uuid,
}

impl SessionGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        tracing::debug!(session = %self.id, "sse session closed");
    }
}
