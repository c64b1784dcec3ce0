//! WebSocket layer: endpoint table, handshake inspection and sessions.
//!
//! Four endpoints are served: `/foo`, `/bar` and `/` echo every frame,
//! `/rtt` answers a single timestamp and closes.

pub mod connection_id;
pub mod echo;
pub mod handler;
pub mod handshake;
pub mod route;
pub mod rtt;
pub mod session;

use std::net::SocketAddr;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::routing::get;

use crate::app_state::AppState;
use handler::ws_handler;
use route::RouteTable;

/// Builds the router with one upgrade route per entry of `routes`.
pub fn build_router(routes: &RouteTable) -> Router<AppState> {
    routes.endpoints().fold(Router::new(), |router, endpoint| {
        router.route(
            endpoint.path(),
            get(
                move |ws: WebSocketUpgrade,
                      info: ConnectInfo<SocketAddr>,
                      state: State<AppState>| ws_handler(endpoint, ws, info, state),
            ),
        )
    })
}
