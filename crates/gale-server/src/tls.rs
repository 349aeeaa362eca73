//! Optional TLS for the listener.
//!
//! The ring provider is passed explicitly, so the config never depends on
//! which rustls provider other crates in the build happen to enable.

use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::errors::ServerError;

/// Build the acceptor config from a PEM certificate chain and key. Only
/// HTTP/1.1 is offered, since the planes are WebSocket upgrades.
pub fn load_rustls_config(cert: &Path, key: &Path) -> Result<RustlsConfig, ServerError> {
    let chain = CertificateDer::pem_file_iter(cert)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ServerError::tls(cert, e))?;
    if chain.is_empty() {
        return Err(ServerError::tls(cert, "no certificates found"));
    }
    let private_key = PrivateKeyDer::from_pem_file(key).map_err(|e| ServerError::tls(key, e))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .and_then(|builder| builder.with_no_client_auth().with_single_cert(chain, private_key))
        .map_err(|e| ServerError::tls(cert, e))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(RustlsConfig::from_config(Arc::new(config)))
}
