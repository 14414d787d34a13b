//! QUIC transport configuration helpers
//!
//! Server and client share the same idle timeout and keep-alive so that a
//! long-lived admin or auth connection survives quiet periods.

pub mod verify;

pub use verify::{fingerprint, normalize_fingerprint, FingerprintVerifier, SkipVerification};

use quinn::{ClientConfig, IdleTimeout, ServerConfig, TransportConfig, VarInt};
use rustls::client::danger::ServerCertVerifier;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::sync::Arc;
use std::time::Duration;

use crate::{CoreError, Result};

/// SNI name presented by clients; the verifier ignores it
pub const SERVER_NAME: &str = "antibrute";

const IDLE_TIMEOUT_MS: u32 = 30_000;
const KEEP_ALIVE: Duration = Duration::from_secs(5);

fn transport_config() -> TransportConfig {
    let mut transport = TransportConfig::default();
    transport.max_idle_timeout(Some(IdleTimeout::from(VarInt::from_u32(IDLE_TIMEOUT_MS))));
    transport.keep_alive_interval(Some(KEEP_ALIVE));
    transport
}

/// Configure QUIC client around a certificate verifier
pub fn configure_client(verifier: Arc<dyn ServerCertVerifier>) -> Result<ClientConfig> {
    let crypto = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(&[&rustls::version::TLS13])
    .map_err(|e| CoreError::Protocol(format!("Failed to configure TLS: {}", e)))?
    .dangerous()
    .with_custom_certificate_verifier(verifier)
    .with_no_client_auth();

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| CoreError::Protocol(format!("Failed to create QUIC crypto config: {}", e)))?;

    let mut config = ClientConfig::new(Arc::new(quic_crypto));
    config.transport_config(Arc::new(transport_config()));
    Ok(config)
}

/// Configure QUIC server with a single certificate
pub fn configure_server(
    cert: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig> {
    let mut config = ServerConfig::with_single_cert(cert, key)
        .map_err(|e| CoreError::Protocol(format!("Failed to configure TLS: {}", e)))?;

    config.transport_config(Arc::new(transport_config()));
    Ok(config)
}
