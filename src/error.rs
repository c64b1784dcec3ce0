//! Gateway and probe error types.
//!
//! [`GatewayError`] is the central error type for the server. Each variant
//! maps to a numeric error code and an HTTP status code; only rejected
//! upgrades are ever rendered to a client; the rest are startup failures
//! or reasons to drop a socket.
//!
//! [`ProbeError`] covers the companion RTT client.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "upgrade header is not \"websocket\": received [h2c]"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | Outcome                        |
/// |-----------|-------------------|--------------------------------|
/// | 1000–1999 | Protocol          | 400 response or socket dropped |
/// | 2000–2999 | Startup / config  | process exits                  |
/// | 3000–3999 | Transport         | single connection dropped      |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request did not carry `Upgrade: websocket`.
    #[error("upgrade header is not \"websocket\": received [{}]", .0.as_deref().unwrap_or("none"))]
    InvalidUpgrade(Option<String>),

    /// The request path is not one of the known endpoints.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A certificate or key file could not be read.
    #[error("cannot read tls material {path}: {source}")]
    TlsMaterial {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O or PEM error.
        #[source]
        source: std::io::Error,
    },

    /// The certificate file contained no certificates.
    #[error("no certificates found in {0}")]
    EmptyCertificateChain(PathBuf),

    /// The key file contained no private key.
    #[error("no private key found in {0}")]
    MissingPrivateKey(PathBuf),

    /// TLS configuration was rejected by rustls.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidUpgrade(_) => 1001,
            Self::UnknownEndpoint(_) => 1002,
            Self::Config(_) => 2001,
            Self::TlsMaterial { .. } => 2002,
            Self::EmptyCertificateChain(_) => 2003,
            Self::MissingPrivateKey(_) => 2004,
            Self::Tls(_) => 3001,
            Self::Io(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidUpgrade(_) => StatusCode::BAD_REQUEST,
            Self::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
            Self::Config(_)
            | Self::TlsMaterial { .. }
            | Self::EmptyCertificateChain(_)
            | Self::MissingPrivateKey(_)
            | Self::Tls(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the connection must be dropped without writing
    /// any HTTP response.
    #[must_use]
    pub const fn aborts_connection(&self) -> bool {
        matches!(self, Self::UnknownEndpoint(_))
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Errors raised by the RTT probe client.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The base URI does not use the `ws` or `wss` scheme.
    #[error("unsupported uri {0}: expected ws://host:port or wss://host:port")]
    UnsupportedScheme(String),

    /// The custom CA file could not be loaded.
    #[error("cannot load ca certificate: {0}")]
    CaCertificate(#[source] GatewayError),

    /// The TLS client configuration was rejected.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    /// The connection or handshake to the server failed.
    #[error("{source}: {url}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying WebSocket error.
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// The connection failed after the handshake.
    #[error("{source}: {url}")]
    Transport {
        /// Target URL.
        url: String,
        /// Underlying WebSocket error.
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// The server closed the connection without replying.
    #[error("connection closed before a reply was received: {0}")]
    ClosedBeforeReply(String),
}
