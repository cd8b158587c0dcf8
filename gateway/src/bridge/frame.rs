//! Correlation-id rewriting on tool-protocol frames
//!
//! The tool protocol is opaque to the gateway except for one convention: a
//! frame is a JSON object, and responses carry the `id` of the request they
//! answer. The gateway stamps every outbound frame with its own `u64`
//! correlation id and restores the client's original `id` member before
//! delivery, so concurrent sessions never collide even when clients reuse
//! ids — and a verbatim-echo child round-trips byte-for-byte.

use serde_json::{Map, Value};

/// The `id` member as it appeared on the inbound client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OriginalId {
    /// The client sent no `id`; the stamped id is stripped on the way back.
    Absent,
    /// The client's own `id` value, reinstated on the way back.
    Present(Value),
}

/// Overwrite the frame's `id` with the gateway correlation id.
pub fn stamp(frame: &mut Map<String, Value>, correlation_id: u64) -> OriginalId {
    match frame.insert("id".to_string(), Value::from(correlation_id)) {
        Some(previous) => OriginalId::Present(previous),
        None => OriginalId::Absent,
    }
}

/// Put the client's original `id` back on a correlated response frame.
pub fn restore(frame: &mut Value, original: &OriginalId) {
    if let Some(object) = frame.as_object_mut() {
        match original {
            OriginalId::Present(id) => {
                object.insert("id".to_string(), id.clone());
            }
            OriginalId::Absent => {
                object.remove("id");
            }
        }
    }
}
