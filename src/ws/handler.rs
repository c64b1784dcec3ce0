//! Axum WebSocket upgrade handler.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use tracing::Instrument;

use super::connection_id::ConnectionId;
use super::echo::run_echo_session;
use super::route::Endpoint;
use super::rtt::run_rtt_session;
use super::session::SessionContext;
use crate::app_state::AppState;

/// `GET /foo`, `/bar`, `/rtt` and `/`: upgrade the HTTP connection to
/// WebSocket and run the endpoint's session on its own task.
///
/// No subprotocol is selected, whatever the client asked for.
pub async fn ws_handler(
    endpoint: Endpoint,
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let ctx = SessionContext {
        id: ConnectionId::new(),
        peer,
        endpoint,
        idle_timeout: state.idle_timeout,
    };
    let span = tracing::info_span!("ws", id = %ctx.id, peer = %peer, path = ctx.endpoint.path());

    ws.on_failed_upgrade(move |e| tracing::warn!(error = %e, %peer, "websocket upgrade failed"))
        .on_upgrade(move |socket| {
            async move {
                match ctx.endpoint.greeting() {
                    Some(greeting) => run_echo_session(socket, greeting, ctx).await,
                    None => run_rtt_session(socket, state.rtt_mode, ctx).await,
                }
            }
            .instrument(span)
        })
}
