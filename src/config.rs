//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable               | Default             |
//! |------------------------|---------------------|
//! | `WS_BIND_HOST`         | `0.0.0.0`           |
//! | `WS_PORT`              | `6080`              |
//! | `WSS_PORT`             | `6443`              |
//! | `TLS_CERT_PATH`        | `ssl/websocket.crt` |
//! | `TLS_KEY_PATH`         | `ssl/websocket.key` |
//! | `RTT_MODE`             | `echo`              |
//! | `WS_IDLE_TIMEOUT_SECS` | `0` (disabled)      |
//! | `LOG_FORMAT`           | `text`              |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::GatewayError;
use crate::ws::rtt::RttMode;

/// Default plaintext listener port.
pub const DEFAULT_WS_PORT: u16 = 6080;

/// Default TLS listener port.
pub const DEFAULT_WSS_PORT: u16 = 6443;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(GatewayError::Config(format!(
                "LOG_FORMAT must be \"text\" or \"json\", got {other:?}"
            ))),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address both listeners bind to.
    pub bind_host: IpAddr,

    /// Plaintext (`ws://`) listener port.
    pub ws_port: u16,

    /// TLS (`wss://`) listener port.
    pub wss_port: u16,

    /// PEM certificate chain for the TLS listener.
    pub tls_cert_path: PathBuf,

    /// PEM private key for the TLS listener.
    pub tls_key_path: PathBuf,

    /// Reply semantics of the `/rtt` endpoint.
    pub rtt_mode: RttMode,

    /// Seconds a session may wait for a frame before it is closed
    /// (0 = never).
    pub idle_timeout_secs: u64,

    /// Log output format.
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file,
    /// then delegates to [`GatewayConfig::from_lookup`].
    ///
    /// # Errors
    ///
    /// See [`GatewayConfig::from_lookup`].
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Numeric settings fall back to their default when missing or
    /// unparsable.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if `WS_BIND_HOST`, `RTT_MODE` or
    /// `LOG_FORMAT` is set to a value that cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_host = match lookup("WS_BIND_HOST") {
            Some(raw) => raw.parse().map_err(|_| {
                GatewayError::Config(format!("WS_BIND_HOST is not an ip address: {raw:?}"))
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let ws_port = parse_or(&lookup, "WS_PORT", DEFAULT_WS_PORT);
        let wss_port = parse_or(&lookup, "WSS_PORT", DEFAULT_WSS_PORT);

        let tls_cert_path = lookup("TLS_CERT_PATH")
            .map_or_else(|| PathBuf::from("ssl/websocket.crt"), PathBuf::from);
        let tls_key_path = lookup("TLS_KEY_PATH")
            .map_or_else(|| PathBuf::from("ssl/websocket.key"), PathBuf::from);

        let rtt_mode = lookup("RTT_MODE")
            .map(|raw| raw.parse::<RttMode>())
            .transpose()?
            .unwrap_or_default();

        let idle_timeout_secs = parse_or(&lookup, "WS_IDLE_TIMEOUT_SECS", 0);

        let log_format = lookup("LOG_FORMAT")
            .map(|raw| raw.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            bind_host,
            ws_port,
            wss_port,
            tls_cert_path,
            tls_key_path,
            rtt_mode,
            idle_timeout_secs,
            log_format,
        })
    }

    /// Socket address of the plaintext listener.
    #[must_use]
    pub const fn plain_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.ws_port)
    }

    /// Socket address of the TLS listener.
    #[must_use]
    pub const fn tls_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.wss_port)
    }

    /// Idle timeout, or `None` when disabled.
    #[must_use]
    pub const fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_secs))
        }
    }
}

/// Parses `key` as `T`, returning `default` on missing or invalid values.
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
