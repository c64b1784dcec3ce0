//! Shared application state injected into the WebSocket handlers.

use std::time::Duration;

use crate::config::GatewayConfig;
use crate::ws::rtt::RttMode;

/// Read-only settings every session needs, available to handlers via
/// Axum's `State` extractor.
///
/// Holds no per-connection data; sessions share nothing mutable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppState {
    /// Reply semantics of the `/rtt` endpoint.
    pub rtt_mode: RttMode,
    /// How long a session waits for the next frame, if bounded.
    pub idle_timeout: Option<Duration>,
}

impl From<&GatewayConfig> for AppState {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            rtt_mode: config.rtt_mode,
            idle_timeout: config.idle_timeout(),
        }
    }
}
