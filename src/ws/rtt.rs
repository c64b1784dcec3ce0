//! One-shot round-trip-time session for `/rtt`.
//!
//! `CONNECTED → AWAIT_TIMESTAMP → RESPONDED → CLOSED`. The client sends
//! its wall-clock time in milliseconds as a decimal string; the server
//! answers once according to [`RttMode`] and then closes. A client takes
//! one sample per connection.

use std::fmt;
use std::str::FromStr;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};

use super::session::{SessionContext, await_close_ack, next_message};
use crate::error::GatewayError;
use crate::timestamp::{group_thousands, now_millis, parse_millis};

/// How the `/rtt` endpoint answers a client timestamp.
///
/// The two modes measure different things, so a process runs exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RttMode {
    /// Send the client's payload back unchanged. The client's
    /// `now - echoed` is a pure round trip.
    #[default]
    Echo,
    /// Reply with the server's own clock. The client's `now - server`
    /// covers the return leg plus the clock skew between the two hosts.
    ServerClock,
}

impl RttMode {
    /// Configuration name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::ServerClock => "server_clock",
        }
    }
}

impl fmt::Display for RttMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RttMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "echo" => Ok(Self::Echo),
            "server_clock" | "server-clock" => Ok(Self::ServerClock),
            other => Err(GatewayError::Config(format!(
                "RTT_MODE must be \"echo\" or \"server_clock\", got {other:?}"
            ))),
        }
    }
}

/// Builds the reply to a client timestamp frame.
///
/// `server_now_ms` is only used in [`RttMode::ServerClock`].
#[must_use]
pub fn rtt_reply(mode: RttMode, message: Message, server_now_ms: i64) -> Message {
    let payload = match &message {
        Message::Text(text) => text.as_str().to_string(),
        Message::Binary(data) => String::from_utf8_lossy(data).into_owned(),
        _ => String::new(),
    };
    if parse_millis(&payload).is_some() {
        tracing::info!("Timestamp from client: {} ms", group_thousands(payload.trim()));
    } else {
        tracing::warn!(%payload, "rtt payload is not a millisecond timestamp");
    }

    match mode {
        RttMode::Echo => message,
        RttMode::ServerClock => Message::text(server_now_ms.to_string()),
    }
}

/// Runs one RTT exchange: await a data frame, reply, close.
pub async fn run_rtt_session(mut socket: WebSocket, mode: RttMode, ctx: SessionContext) {
    tracing::info!(peer = %ctx.peer, path = ctx.endpoint.path(), %mode, "rtt connection opened");

    let request = loop {
        match next_message(&mut socket, ctx.idle_timeout).await {
            Some(message @ (Message::Text(_) | Message::Binary(_))) => break Some(message),
            Some(Message::Ping(_) | Message::Pong(_)) => {}
            Some(Message::Close(_)) | None => break None,
        }
    };

    let Some(request) = request else {
        tracing::info!("connection closed before a timestamp was received");
        return;
    };

    let reply = rtt_reply(mode, request, now_millis());
    if let Err(e) = socket.send(reply).await {
        tracing::debug!(error = %e, "failed to send rtt reply");
        return;
    }

    let close = CloseFrame {
        code: close_code::NORMAL,
        reason: Utf8Bytes::from("rtt sample complete"),
    };
    if let Err(e) = socket.send(Message::Close(Some(close))).await {
        tracing::debug!(error = %e, "failed to send close frame");
        return;
    }

    await_close_ack(socket).await;

    tracing::info!("connection closed");
}
