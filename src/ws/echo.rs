//! Echo session for `/foo`, `/bar` and `/`.
//!
//! `CONNECTED → (receive → send same payload)* → CLOSED`. The greeting is
//! sent once on entry; every data frame afterwards is written back with
//! its type preserved. Nothing carries over between frames.

use axum::extract::ws::{Message, WebSocket};

use super::session::{SessionContext, next_message};

/// What the session does with one inbound frame.
#[derive(Debug, PartialEq)]
pub(crate) enum EchoStep {
    /// Write this frame back.
    Reply(Message),
    /// Control frame handled by the transport; keep reading.
    Skip,
    /// The peer closed.
    Stop,
}

/// Maps an inbound frame to the session's next step.
pub(crate) fn echo_step(message: Message) -> EchoStep {
    match message {
        Message::Text(text) => {
            tracing::info!("received: {}", text.as_str());
            EchoStep::Reply(Message::Text(text))
        }
        Message::Binary(data) => {
            tracing::info!(bytes = data.len(), "received: {}", String::from_utf8_lossy(&data));
            EchoStep::Reply(Message::Binary(data))
        }
        Message::Ping(_) | Message::Pong(_) => EchoStep::Skip,
        Message::Close(_) => EchoStep::Stop,
    }
}

/// Runs an echo session until the peer closes or the transport fails.
pub async fn run_echo_session(mut socket: WebSocket, greeting: &'static str, ctx: SessionContext) {
    tracing::info!(peer = %ctx.peer, path = ctx.endpoint.path(), "connection opened");

    if let Err(e) = socket.send(Message::text(greeting)).await {
        tracing::debug!(error = %e, "failed to send greeting");
        return;
    }

    while let Some(message) = next_message(&mut socket, ctx.idle_timeout).await {
        match echo_step(message) {
            EchoStep::Reply(reply) => {
                if let Err(e) = socket.send(reply).await {
                    tracing::debug!(error = %e, "failed to echo frame");
                    break;
                }
            }
            EchoStep::Skip => {}
            EchoStep::Stop => break,
        }
    }

    tracing::info!("connection closed");
}
