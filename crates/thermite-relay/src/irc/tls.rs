//! TLS client configuration for IRC connections.
//!
//! Without a pinned fingerprint the server certificate is checked against the
//! webpki root store. With one, exactly the certificate whose SHA-256 digest
//! matches is accepted, which is how self-signed network certificates are
//! trusted on the read side.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use sha2::{Digest, Sha256};
use tokio_rustls::TlsConnector;
use tracing::info;

/// Lowercase hex SHA-256 of a DER certificate.
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Build a connector, pinning `pinned` (lowercase hex, no separators) if given.
pub fn connector(pinned: Option<String>) -> Result<TlsConnector, TlsConfigError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsConfigError::Build(e.to_string()))?;

    let config = if let Some(fingerprint) = pinned {
        info!(fingerprint = %fingerprint, "TLS certificate pinned");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PinnedVerifier {
                fingerprint,
                provider,
            }))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// SNI/verification name for `host`.
pub fn server_name(host: &str) -> Result<ServerName<'static>, TlsConfigError> {
    ServerName::try_from(host.to_string()).map_err(|e| TlsConfigError::ServerName(e.to_string()))
}

#[derive(Debug)]
struct PinnedVerifier {
    fingerprint: String,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let actual = fingerprint(end_entity.as_ref());
        if actual == self.fingerprint {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General(format!(
                "certificate fingerprint mismatch: got {actual}"
            )))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// TLS setup errors.
#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("Failed to build TLS config: {0}")]
    Build(String),

    #[error("Invalid server name: {0}")]
    ServerName(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn pinned_verifier_rejects_other_certificates() {
        let verifier = PinnedVerifier {
            fingerprint: fingerprint(b"expected"),
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        };
        let name = server_name("irc.example.net").unwrap();
        let now = UnixTime::now();

        let good = CertificateDer::from(b"expected".to_vec());
        assert!(verifier.verify_server_cert(&good, &[], &name, &[], now).is_ok());

        let bad = CertificateDer::from(b"other".to_vec());
        assert!(verifier.verify_server_cert(&bad, &[], &name, &[], now).is_err());
    }

    #[test]
    fn connector_builds_with_and_without_pin() {
        assert!(connector(None).is_ok());
        assert!(connector(Some("00".repeat(32))).is_ok());
    }

    #[test]
    fn server_name_accepts_hosts_and_ips() {
        assert!(server_name("irc.libera.chat").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("not a host").is_err());
    }
}
