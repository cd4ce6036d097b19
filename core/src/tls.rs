//! TLS plumbing for the wire client: trust-on-first-use verification, client
//! certificates and the session details kept on a `Response`.
//!
//! # Design
//! Gemini servers overwhelmingly use self-signed certificates, so standard
//! chain and hostname validation is replaced wholesale by `TofuVerifier`. It
//! hands the leaf certificate to the caller's `TrustCertificate` callback,
//! synchronously inside the handshake, and accepts whatever the callback
//! accepts. Without a callback every certificate is accepted. Handshake
//! signatures are still checked, so a peer must hold the key for the
//! certificate it presents.
//!
//! `CertificateSummary` decodes just enough X.509 to show who issued a
//! certificate and when it is valid; nothing here relies on it for trust.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
pub use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::pki_types::{ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, ProtocolVersion, SignatureScheme};
use sha2::{Digest, Sha256};

use crate::error::GeminiError;

/// Decision returned by a trust callback; any error aborts the handshake.
pub type TrustResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Trust callback invoked with the hostname and the peer's leaf certificate.
pub type TrustCertificate = Arc<dyn Fn(&str, &CertificateDer<'_>) -> TrustResult + Send + Sync>;

/// A client certificate chain and its private key, presented when the
/// server asks for one.
#[derive(Debug)]
pub struct ClientCertificate {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Peer TLS session details captured after the handshake.
#[derive(Debug, Clone, Default)]
pub struct TlsInfo {
    pub peer_certificates: Vec<CertificateDer<'static>>,
    pub protocol_version: Option<ProtocolVersion>,
    pub cipher_suite: Option<rustls::CipherSuite>,
}

impl TlsInfo {
    pub(crate) fn from_connection(conn: &ClientConnection) -> Self {
        Self {
            peer_certificates: conn
                .peer_certificates()
                .map(|certs| certs.to_vec())
                .unwrap_or_default(),
            protocol_version: conn.protocol_version(),
            cipher_suite: conn.negotiated_cipher_suite().map(|s| s.suite()),
        }
    }

    pub fn leaf_certificate(&self) -> Option<&CertificateDer<'static>> {
        self.peer_certificates.first()
    }

    /// SHA-256 digest of the leaf certificate's DER encoding.
    pub fn fingerprint(&self) -> Option<[u8; 32]> {
        self.leaf_certificate().map(fingerprint)
    }

    /// Issuer and validity of the leaf certificate; `None` without one.
    pub fn leaf_summary(&self) -> Result<Option<CertificateSummary>, GeminiError> {
        self.leaf_certificate().map(CertificateSummary::parse).transpose()
    }
}

/// Issuer and validity window of a certificate, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// First common name in the issuer DN, if any.
    pub issuer_common_name: Option<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateSummary {
    pub fn parse(cert: &CertificateDer<'_>) -> Result<Self, GeminiError> {
        let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref())
            .map_err(|e| GeminiError::Certificate(e.to_string()))?;
        let issuer_common_name = parsed
            .issuer()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);
        let validity = parsed.validity();
        Ok(Self {
            issuer_common_name,
            not_before: utc(validity.not_before.timestamp())?,
            not_after: utc(validity.not_after.timestamp())?,
        })
    }
}

fn utc(secs: i64) -> Result<DateTime<Utc>, GeminiError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| GeminiError::Certificate(format!("timestamp {secs} out of range")))
}

/// SHA-256 digest of a certificate's DER encoding.
pub fn fingerprint(cert: &CertificateDer<'_>) -> [u8; 32] {
    Sha256::digest(cert.as_ref()).into()
}

pub(crate) struct TofuVerifier {
    hostname: String,
    trust: Option<TrustCertificate>,
    provider: Arc<CryptoProvider>,
}

impl fmt::Debug for TofuVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TofuVerifier")
            .field("hostname", &self.hostname)
            .field("trust", &self.trust.as_ref().map(|_| "Fn(..)"))
            .finish()
    }
}

impl ServerCertVerifier for TofuVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Some(trust) = &self.trust {
            trust(&self.hostname, end_entity).map_err(|err| {
                tracing::debug!(host = %self.hostname, "certificate rejected: {err}");
                rustls::Error::General(format!("certificate not trusted: {err}"))
            })?;
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(
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
        crypto::verify_tls13_signature(
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

/// Build the per-request client config: TOFU verification plus either the
/// request's client certificate or an empty certificate response.
pub(crate) fn client_config(
    hostname: &str,
    trust: Option<TrustCertificate>,
    certificate: Option<&ClientCertificate>,
) -> Result<ClientConfig, GeminiError> {
    let provider = Arc::new(crypto::ring::default_provider());
    let verifier = TofuVerifier {
        hostname: hostname.to_string(),
        trust,
        provider: provider.clone(),
    };
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier));
    let config = match certificate {
        Some(cert) => builder.with_client_auth_cert(cert.chain.clone(), cert.key.clone_key())?,
        None => builder.with_no_client_auth(),
    };
    Ok(config)
}
