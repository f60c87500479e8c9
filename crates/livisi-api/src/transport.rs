// Shared transport configuration for the REST client and the event socket.
//
// Both surfaces share TLS and timeout settings through this module. The
// rustls `ClientConfig` built here is handed to reqwest and to
// tokio-tungstenite, so the certificate policy is identical on both.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

use crate::error::Error;

const USER_AGENT: &str = concat!("livisi-rs/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode (api-level mirror of core's `TlsVerification`).
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the bundled webpki root store.
    System,
    /// Trust the CA certificate(s) in the given PEM file.
    CustomCa(PathBuf),
    /// Accept a self-signed certificate, but only if it names the host
    /// being connected to.
    #[default]
    AcceptSelfSigned,
    /// Accept any certificate.
    DangerAcceptInvalid,
}

/// Shared transport configuration for building clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(USER_AGENT);

        builder = match &self.tls {
            TlsMode::System => builder,
            TlsMode::CustomCa(_) | TlsMode::AcceptSelfSigned => {
                let config = self.rustls_config()?.ok_or_else(|| {
                    Error::Tls("no TLS configuration for custom verification".into())
                })?;
                builder.use_preconfigured_tls((*config).clone())
            }
            TlsMode::DangerAcceptInvalid => builder.danger_accept_invalid_certs(true),
        };

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Timeout in whole seconds, for error reporting.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs().max(1)
    }

    /// The rustls client configuration for this TLS mode.
    ///
    /// Returns `None` for [`TlsMode::System`], where the libraries' own
    /// webpki-roots defaults apply.
    pub fn rustls_config(&self) -> Result<Option<Arc<rustls::ClientConfig>>, Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?;

        let config = match &self.tls {
            TlsMode::System => return Ok(None),
            TlsMode::CustomCa(path) => {
                let mut roots = rustls::RootCertStore::empty();
                let certs = CertificateDer::pem_file_iter(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                for cert in certs {
                    let cert = cert.map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                    roots
                        .add(cert)
                        .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                }
                builder.with_root_certificates(roots).with_no_client_auth()
            }
            TlsMode::AcceptSelfSigned => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(HostBoundVerifier::new(
                    &provider,
                    true,
                )))
                .with_no_client_auth(),
            TlsMode::DangerAcceptInvalid => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(HostBoundVerifier::new(
                    &provider, false,
                )))
                .with_no_client_auth(),
        };

        Ok(Some(Arc::new(config)))
    }
}

// ── Certificate verification ────────────────────────────────────────

/// Skips chain-of-trust validation (the SHC signs its own certificate)
/// while still checking the handshake signatures and, optionally, that
/// the certificate was issued for the host we dialed.
#[derive(Debug)]
struct HostBoundVerifier {
    algorithms: WebPkiSupportedAlgorithms,
    check_name: bool,
}

impl HostBoundVerifier {
    fn new(provider: &CryptoProvider, check_name: bool) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
            check_name,
        }
    }
}

impl ServerCertVerifier for HostBoundVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.check_name {
            let cert = webpki::EndEntityCert::try_from(end_entity)
                .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))?;
            cert.verify_is_valid_for_subject_name(server_name)
                .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::NotValidForName))?;
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_accepts_self_signed() {
        let config = TransportConfig::default();
        assert!(matches!(config.tls, TlsMode::AcceptSelfSigned));
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn system_mode_uses_library_defaults() {
        let config = TransportConfig {
            tls: TlsMode::System,
            ..TransportConfig::default()
        };
        assert!(config.rustls_config().unwrap().is_none());
    }

    #[test]
    fn self_signed_mode_builds_custom_config() {
        let config = TransportConfig::default();
        assert!(config.rustls_config().unwrap().is_some());
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn missing_ca_file_is_tls_error() {
        let config = TransportConfig {
            tls: TlsMode::CustomCa("/nonexistent/ca.pem".into()),
            ..TransportConfig::default()
        };
        assert!(matches!(config.rustls_config(), Err(Error::Tls(_))));
    }
}
