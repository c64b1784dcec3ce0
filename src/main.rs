//! echo-gateway server entry point.
//!
//! Loads TLS material, then serves the WebSocket endpoints on the
//! plaintext and TLS listeners until Ctrl-C.

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use echo_gateway::app_state::AppState;
use echo_gateway::config::{GatewayConfig, LogFormat};
use echo_gateway::error::GatewayError;
use echo_gateway::server::Gateway;
use echo_gateway::tls::load_tls_acceptor;

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    // Load configuration
    let config = GatewayConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
    tracing::info!(
        plain = %config.plain_addr(),
        tls = %config.tls_addr(),
        rtt_mode = %config.rtt_mode,
        "starting echo-gateway"
    );

    // TLS material is required before either listener starts
    let acceptor = load_tls_acceptor(&config.tls_cert_path, &config.tls_key_path)
        .inspect_err(|e| tracing::error!(error = %e, "cannot start tls listener"))?;

    let gateway = Gateway::new(AppState::from(&config));

    // Start listeners
    let plain = TcpListener::bind(config.plain_addr()).await?;
    let secure = TcpListener::bind(config.tls_addr()).await?;
    tracing::info!(port = config.ws_port, "HTTP server listening");
    tracing::info!(port = config.wss_port, "HTTPS server listening");

    tokio::select! {
        () = gateway.clone().serve_plain(plain) => {}
        () = gateway.serve_tls(secure, acceptor) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "cannot listen for shutdown signal");
            }
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
