//! Server certificate verification for self-signed endpoints
//!
//! The server presents a self-signed certificate; clients pin it by its
//! SHA-256 fingerprint instead of relying on a CA.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use sha2::{Digest, Sha256};

/// SHA-256 fingerprint of a DER certificate, as `AA:BB:...`
pub fn fingerprint(cert: &CertificateDer<'_>) -> String {
    Sha256::digest(cert.as_ref())
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Strip separators and case: "aa:bb-cc" → "AABBCC"
pub fn normalize_fingerprint(fp: &str) -> String {
    fp.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Accepts only the certificate whose fingerprint matches
#[derive(Debug)]
pub struct FingerprintVerifier {
    expected: String,
}

impl FingerprintVerifier {
    pub fn new(expected: &str) -> Self {
        Self {
            expected: normalize_fingerprint(expected),
        }
    }
}

impl ServerCertVerifier for FingerprintVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let actual = normalize_fingerprint(&fingerprint(end_entity));
        if actual == self.expected {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::error!(
                expected = %self.expected,
                got = %actual,
                "Server certificate fingerprint mismatch"
            );
            Err(rustls::Error::General("Fingerprint mismatch".to_string()))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Accepts any certificate. Local testing only.
#[derive(Debug)]
pub struct SkipVerification;

impl ServerCertVerifier for SkipVerification {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fingerprint() {
        assert_eq!(normalize_fingerprint("AA:BB:CC"), "AABBCC");
        assert_eq!(normalize_fingerprint("aa:bb:cc"), "AABBCC");
        assert_eq!(normalize_fingerprint("aa-bb cc"), "AABBCC");
    }

    #[test]
    fn test_fingerprint_format() {
        let cert = CertificateDer::from(b"test certificate data".to_vec());
        let fp = fingerprint(&cert);
        // 32 bytes = 64 hex chars + 31 colons
        assert_eq!(fp.len(), 95);
        assert_eq!(fp.chars().filter(|c| *c == ':').count(), 31);
        assert_eq!(fp, fp.to_uppercase());
    }

    #[test]
    fn test_verifier_matches_pinned_cert() {
        let cert = CertificateDer::from(b"pinned".to_vec());
        let other = CertificateDer::from(b"other".to_vec());
        let verifier = FingerprintVerifier::new(&fingerprint(&cert).to_lowercase());
        let name = ServerName::try_from("antibrute").unwrap();

        assert!(verifier
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_ok());
        assert!(verifier
            .verify_server_cert(&other, &[], &name, &[], UnixTime::now())
            .is_err());
    }
}
