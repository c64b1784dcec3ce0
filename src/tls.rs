//! TLS material loading for the `wss://` listener.
//!
//! Certificates and keys are PEM files read once at startup. rustls runs
//! on the `ring` provider.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::error::GatewayError;

/// Builds a [`TlsAcceptor`] from a PEM certificate chain and private key.
///
/// # Errors
///
/// Returns an error if either file is missing or unreadable, the chain is
/// empty, the key file holds no key, or rustls rejects the pair.
pub fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, GatewayError> {
    let certs = load_certificates(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    tracing::debug!(cert = %cert_path.display(), key = %key_path.display(), "tls material loaded");
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Reads every certificate from a PEM file.
///
/// # Errors
///
/// Returns [`GatewayError::TlsMaterial`] if the file cannot be read and
/// [`GatewayError::EmptyCertificateChain`] if it holds no certificate.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, GatewayError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| GatewayError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(GatewayError::EmptyCertificateChain(path.to_path_buf()));
    }
    Ok(certs)
}

/// Reads the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file.
///
/// # Errors
///
/// Returns [`GatewayError::TlsMaterial`] if the file cannot be read and
/// [`GatewayError::MissingPrivateKey`] if it holds no key.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, GatewayError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| GatewayError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| GatewayError::MissingPrivateKey(path.to_path_buf()))
}

fn open(path: &Path) -> Result<BufReader<File>, GatewayError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| GatewayError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })
}
