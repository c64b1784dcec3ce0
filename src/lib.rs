//! # echo-gateway
//!
//! WebSocket echo and round-trip-time gateway.
//!
//! Two listeners, one plaintext (`ws://`, default port 6080) and one
//! TLS-terminated (`wss://`, default port 6443), accept HTTP/1.1 upgrade
//! requests and route them by exact path:
//!
//! | Path   | Session                                            |
//! |--------|----------------------------------------------------|
//! | `/foo` | greeting, then echo every frame                    |
//! | `/bar` | greeting, then echo every frame                    |
//! | `/`    | greeting, then echo every frame                    |
//! | `/rtt` | answer one timestamp, then close                   |
//!
//! ## Architecture
//!
//! ```text
//! Clients (ws://, wss://)
//!     │
//!     ├── Listeners + TLS (server, tls)
//!     │
//!     ├── Upgrade router (server::Gateway::dispatch)
//!     │       400 on bad Upgrade, socket drop on unknown path
//!     │
//!     ├── Axum router + WebSocketUpgrade (ws/handler)
//!     │
//!     └── Sessions: echo (ws/echo), rtt (ws/rtt)
//! ```
//!
//! The [`probe`] module is the matching client, used by the `rtt-probe`
//! binary.

pub mod app_state;
pub mod config;
pub mod error;
pub mod probe;
pub mod server;
pub mod timestamp;
pub mod tls;
pub mod ws;
