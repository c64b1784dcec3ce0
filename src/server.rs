//! Listener loops and the upgrade router.
//!
//! Every accepted socket is served on its own task by a hyper HTTP/1.1
//! connection with upgrades enabled. Each request first goes through
//! [`Gateway::dispatch`], which enforces the upgrade contract:
//!
//! 1. `Upgrade` must be exactly `websocket`, otherwise `400`.
//! 2. The path (query ignored) must name a known endpoint, otherwise the
//!    socket is dropped without any response.
//! 3. Accepted requests go to the Axum router, which performs the
//!    handshake and starts the endpoint's session.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Bytes, HttpBody};
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::error::GatewayError;
use crate::ws::{self, handshake, route::RouteTable};

/// Which listener a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Plaintext `ws://`.
    Plain,
    /// TLS-terminated `wss://`.
    Tls,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("HTTP"),
            Self::Tls => f.write_str("HTTPS"),
        }
    }
}

/// Endpoint table plus the router that serves it.
///
/// Built once at startup; cloning is cheap and shares the table.
#[derive(Debug, Clone)]
pub struct Gateway {
    routes: Arc<RouteTable>,
    router: Router,
}

impl Gateway {
    /// Builds the gateway for every known endpoint.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        let routes = Arc::new(RouteTable::new());
        let router = ws::build_router(&routes)
            .layer(TraceLayer::new_for_http())
            .with_state(state);
        Self { routes, router }
    }

    /// Applies the upgrade contract to one request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnknownEndpoint`] when the path is not
    /// routed. Errors that [abort the connection](GatewayError::aborts_connection)
    /// make the HTTP layer drop the socket without writing a response;
    /// any other error is rendered as its JSON body.
    pub async fn dispatch<B>(
        &self,
        mut request: Request<B>,
        peer: SocketAddr,
        transport: Transport,
    ) -> Result<Response, GatewayError>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<axum::BoxError>,
    {
        tracing::info!(%peer, "{transport} upgrade request");
        let headers = request.headers();
        handshake::log_identity(headers);

        if !handshake::is_websocket_upgrade(headers) {
            let err = GatewayError::InvalidUpgrade(
                handshake::upgrade_header(headers).map(str::to_string),
            );
            tracing::warn!(%peer, error = %err, "rejecting request");
            return Ok(err.into_response());
        }

        handshake::log_subprotocols(headers);

        let path = request.uri().path();
        let Some(endpoint) = self.routes.resolve(path) else {
            tracing::warn!(%peer, %path, "endpoint is invalid; expected /foo, /bar, /rtt or /");
            return Err(GatewayError::UnknownEndpoint(path.to_string()));
        };
        tracing::info!(%peer, path = endpoint.path(), "dispatching upgrade");

        request.extensions_mut().insert(ConnectInfo(peer));
        let response = match self.router.clone().call(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        Ok(response)
    }

    /// Accepts plaintext connections forever.
    pub async fn serve_plain(self, listener: TcpListener) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let gateway = self.clone();
            tokio::spawn(async move {
                gateway.serve_connection(stream, peer, Transport::Plain).await;
            });
        }
    }

    /// Accepts TLS connections forever. Handshake failures drop only the
    /// affected connection.
    pub async fn serve_tls(self, listener: TcpListener, acceptor: TlsAcceptor) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let gateway = self.clone();
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(stream) => gateway.serve_connection(stream, peer, Transport::Tls).await,
                    Err(e) => tracing::warn!(%peer, error = %e, "tls handshake failed"),
                }
            });
        }
    }

    /// Serves HTTP/1.1 on one socket until it closes or is upgraded.
    async fn serve_connection<S>(self, stream: S, peer: SocketAddr, transport: Transport)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let service = hyper::service::service_fn(move |request: Request<Incoming>| {
            let gateway = self.clone();
            async move {
                match gateway.dispatch(request, peer, transport).await {
                    Err(err) if !err.aborts_connection() => Ok(err.into_response()),
                    outcome => outcome,
                }
            }
        });

        let served = http1::Builder::new()
            .timer(TokioTimer::new())
            .serve_connection(TokioIo::new(stream), service)
            .with_upgrades()
            .await;

        if let Err(e) = served {
            tracing::debug!(%peer, %transport, error = %e, "connection dropped");
        }
    }
}
