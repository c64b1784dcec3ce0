//! Round-trip-time probe: the client side of `/rtt`.
//!
//! A probe opens one connection to `<base>/rtt`, sends its wall-clock
//! time in milliseconds, and times the first reply with a monotonic
//! clock. One connection yields exactly one [`RttSample`].
//!
//! Certificate handling for `wss://` is chosen explicitly through
//! [`TrustPolicy`]. [`TrustPolicy::AcceptAny`] disables validation
//! entirely and exists only for demos against self-signed servers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, connect_async_tls_with_config};

use crate::error::ProbeError;
use crate::timestamp::{now_millis, parse_millis};
use crate::tls::load_certificates;

/// How long the probe waits for the server to acknowledge its close frame
/// once the sample is taken.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// How the probe validates a `wss://` server certificate.
#[derive(Debug, Clone, Default)]
pub enum TrustPolicy {
    /// Validate against the bundled WebPKI roots.
    #[default]
    WebPki,
    /// Validate against the given PEM CA file only.
    CustomCa(PathBuf),
    /// Accept any certificate. Demo use only.
    AcceptAny,
}

/// What the server sent back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RttReply {
    /// The sent timestamp, unchanged.
    Echoed,
    /// A different timestamp, taken from the server's clock.
    ServerClock(i64),
    /// Something that is not a timestamp.
    Unrecognized(String),
}

impl RttReply {
    /// Classifies `payload` against the timestamp that was sent.
    #[must_use]
    pub fn classify(payload: &str, sent_at_ms: i64) -> Self {
        match parse_millis(payload) {
            Some(value) if value == sent_at_ms => Self::Echoed,
            Some(value) => Self::ServerClock(value),
            None => Self::Unrecognized(payload.to_string()),
        }
    }
}

/// One completed measurement.
#[derive(Debug, Clone, Serialize)]
pub struct RttSample {
    /// Wall-clock time sent to the server, in ms since the epoch.
    pub sent_at_ms: i64,
    /// Wall-clock time the reply arrived, in ms since the epoch.
    pub received_at_ms: i64,
    /// Round trip measured on the monotonic clock, in ms.
    pub round_trip_ms: u64,
    /// Classified reply.
    pub reply: RttReply,
}

impl RttSample {
    /// Builds a sample from the raw measurement.
    #[must_use]
    pub fn new(sent_at_ms: i64, received_at_ms: i64, round_trip: Duration, payload: &str) -> Self {
        Self {
            sent_at_ms,
            received_at_ms,
            round_trip_ms: u64::try_from(round_trip.as_millis()).unwrap_or(u64::MAX),
            reply: RttReply::classify(payload, sent_at_ms),
        }
    }

    /// `received - server_clock` when the server replied with its own
    /// clock. Includes clock skew, so it can be negative.
    #[must_use]
    pub fn server_clock_delta_ms(&self) -> Option<i64> {
        match self.reply {
            RttReply::ServerClock(server_ms) => Some(self.received_at_ms.saturating_sub(server_ms)),
            RttReply::Echoed | RttReply::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for RttSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Round-Trip Time: {} ms", self.round_trip_ms)?;
        if let Some(delta) = self.server_clock_delta_ms() {
            write!(f, " (server clock delta: {delta} ms)")?;
        }
        Ok(())
    }
}

/// Returns the `/rtt` URL for a `ws://` or `wss://` base URI.
///
/// # Errors
///
/// Returns [`ProbeError::UnsupportedScheme`] for any other scheme.
pub fn rtt_url(base: &str) -> Result<String, ProbeError> {
    let base = base.trim();
    let has_authority = ["ws://", "wss://"]
        .iter()
        .any(|scheme| base.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty()));
    if !has_authority {
        return Err(ProbeError::UnsupportedScheme(base.to_string()));
    }
    Ok(format!("{}/rtt", base.trim_end_matches('/')))
}

/// Client for the `/rtt` endpoint.
#[derive(Debug, Clone)]
pub struct RttProbe {
    url: String,
    tls: Option<Arc<ClientConfig>>,
}

impl RttProbe {
    /// Creates a probe for `base` (e.g. `ws://127.0.0.1:6080`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is not `ws://` or `wss://`, or the TLS
    /// configuration cannot be built.
    pub fn new(base: &str, trust: &TrustPolicy) -> Result<Self, ProbeError> {
        let url = rtt_url(base)?;
        let tls = if url.starts_with("wss://") {
            Some(Arc::new(client_config(trust)?))
        } else {
            None
        };
        Ok(Self { url, tls })
    }

    /// Target URL, including the `/rtt` suffix.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Takes one sample on a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, a frame cannot be
    /// written or read, or the server closes without replying.
    pub async fn measure(&self) -> Result<RttSample, ProbeError> {
        let connector = self.tls.as_ref().map(|config| Connector::Rustls(Arc::clone(config)));
        let (mut stream, _) =
            connect_async_tls_with_config(self.url.as_str(), None, false, connector)
                .await
                .map_err(|source| ProbeError::Connect {
                    url: self.url.clone(),
                    source,
                })?;
        tracing::info!(url = %self.url, "connected");

        let sent_at_ms = now_millis();
        let started = Instant::now();
        stream
            .send(Message::text(sent_at_ms.to_string()))
            .await
            .map_err(|source| self.transport_error(source))?;

        let payload = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => break text.as_str().to_string(),
                Some(Ok(Message::Binary(data))) => break String::from_utf8_lossy(&data).into_owned(),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ProbeError::ClosedBeforeReply(self.url.clone()));
                }
                Some(Ok(_)) => {}
                Some(Err(source)) => return Err(self.transport_error(source)),
            }
        };
        let round_trip = started.elapsed();
        let received_at_ms = now_millis();

        let closed = tokio::time::timeout(CLOSE_TIMEOUT, async {
            if let Err(e) = stream.close(None).await {
                tracing::debug!(error = %e, "close handshake failed");
            }
            while let Some(Ok(_)) = stream.next().await {}
        })
        .await;
        if closed.is_err() {
            tracing::debug!(url = %self.url, "server did not acknowledge close");
        }
        tracing::info!(url = %self.url, "disconnected");

        Ok(RttSample::new(sent_at_ms, received_at_ms, round_trip, &payload))
    }

    fn transport_error(&self, source: tokio_tungstenite::tungstenite::Error) -> ProbeError {
        ProbeError::Transport {
            url: self.url.clone(),
            source,
        }
    }
}

/// Builds the rustls client configuration for `trust`.
///
/// # Errors
///
/// Returns an error if the custom CA file cannot be loaded or rustls
/// rejects the configuration.
pub fn client_config(trust: &TrustPolicy) -> Result<ClientConfig, ProbeError> {
    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;

    let config = match trust {
        TrustPolicy::WebPki => {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TrustPolicy::CustomCa(path) => builder
            .with_root_certificates(custom_roots(path)?)
            .with_no_client_auth(),
        TrustPolicy::AcceptAny => {
            tracing::warn!("certificate validation disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
                .with_no_client_auth()
        }
    };
    Ok(config)
}

fn custom_roots(path: &Path) -> Result<RootCertStore, ProbeError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(path).map_err(ProbeError::CaCertificate)? {
        roots.add(cert)?;
    }
    Ok(roots)
}

/// Verifier that trusts every certificate but still checks handshake
/// signatures.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn appends_rtt_suffix() {
        assert_eq!(rtt_url("ws://127.0.0.1:6080").unwrap(), "ws://127.0.0.1:6080/rtt");
        assert_eq!(rtt_url("wss://127.0.0.1:6443/").unwrap(), "wss://127.0.0.1:6443/rtt");
    }

    #[test]
    fn rejects_other_schemes() {
        for base in ["http://127.0.0.1:6080", "127.0.0.1:6080", "ws://", ""] {
            assert!(matches!(rtt_url(base), Err(ProbeError::UnsupportedScheme(_))));
        }
    }

    #[test]
    fn classifies_replies() {
        assert_eq!(RttReply::classify("1700000000000", 1_700_000_000_000), RttReply::Echoed);
        assert_eq!(
            RttReply::classify("1700000000250", 1_700_000_000_000),
            RttReply::ServerClock(1_700_000_000_250)
        );
        assert_eq!(
            RttReply::classify("pong", 1_700_000_000_000),
            RttReply::Unrecognized("pong".to_string())
        );
    }

    #[test]
    fn echoed_sample_reports_round_trip() {
        let sample = RttSample::new(
            1_700_000_000_000,
            1_700_000_000_012,
            Duration::from_millis(12),
            "1700000000000",
        );
        assert_eq!(sample.round_trip_ms, 12);
        assert_eq!(sample.server_clock_delta_ms(), None);
        assert_eq!(sample.to_string(), "Round-Trip Time: 12 ms");
    }

    #[test]
    fn server_clock_sample_reports_delta() {
        let sample = RttSample::new(
            1_700_000_000_000,
            1_700_000_000_012,
            Duration::from_millis(12),
            "1700000000005",
        );
        assert_eq!(sample.server_clock_delta_ms(), Some(7));
        assert_eq!(
            sample.to_string(),
            "Round-Trip Time: 12 ms (server clock delta: 7 ms)"
        );
    }

    #[test]
    fn sample_serializes_reply_kind() {
        let sample = RttSample::new(1, 3, Duration::from_millis(2), "1");
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["round_trip_ms"], 2);
        assert_eq!(json["reply"]["kind"], "echoed");
    }

    #[test]
    fn plain_probe_has_no_tls() {
        let probe = RttProbe::new("ws://127.0.0.1:6080", &TrustPolicy::AcceptAny).unwrap();
        assert!(probe.tls.is_none());
        assert_eq!(probe.url(), "ws://127.0.0.1:6080/rtt");
    }

    #[test]
    fn secure_probe_builds_tls_for_each_policy() {
        for trust in [TrustPolicy::WebPki, TrustPolicy::AcceptAny] {
            let probe = RttProbe::new("wss://127.0.0.1:6443", &trust).unwrap();
            assert!(probe.tls.is_some());
        }
    }

    #[test]
    fn missing_ca_file_is_an_error() {
        let trust = TrustPolicy::CustomCa("/nonexistent/ca.crt".into());
        assert!(matches!(
            RttProbe::new("wss://127.0.0.1:6443", &trust),
            Err(ProbeError::CaCertificate(_))
        ));
    }
}
