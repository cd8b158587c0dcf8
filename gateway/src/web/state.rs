//! Shared application state

use crate::bridge::Bridge;
use crate::config::Config;

/// State handed to every handler and the auth middleware.
#[derive(Clone)]
pub struct AppState {
    /// Bridge to the supervised tool server.
    pub bridge: Bridge,
    /// Shared secret for bearer auth; `None` disables auth.
    pub api_key: Option<String>,
    /// Path the tool protocol is exposed on.
    pub stream_path: String,
}

impl AppState {
    pub fn new(bridge: Bridge, config: &Config) -> Self {
        Self {
            bridge,
            api_key: config.api_key.clone(),
            stream_path: config.normalized_stream_path(),
        }
    }
}
