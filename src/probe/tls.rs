//! TLS handshake timing and certificate expiry
//!
//! Performs its own handshake against an already resolved address and reads
//! `notAfter` from the leaf certificate. The chain is accepted unverified: an
//! expired or self-signed certificate still has an expiry worth reporting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::trace;

use super::ProbeError;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Result of a successful certificate inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsInfo {
    pub handshake_time: Duration,
    /// Whole days until `notAfter`, rounded up; negative once expired
    pub certificate_expiry_days: i64,
}

#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
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
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Reusable TLS connector for certificate inspection
#[derive(Clone)]
pub struct TlsInspector {
    connector: TlsConnector,
}

impl TlsInspector {
    pub fn new() -> Result<Self, ProbeError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| ProbeError::Config(format!("tls protocol versions: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Handshake with `addrs` presenting `host` as SNI and read the leaf
    /// certificate's validity, all within `limit`.
    pub async fn inspect(
        &self,
        host: &str,
        addrs: &[SocketAddr],
        limit: Duration,
    ) -> Result<TlsInfo, ProbeError> {
        let server_name = ServerName::try_from(
            host.trim_start_matches('[').trim_end_matches(']').to_string(),
        )
        .map_err(|e| ProbeError::Tls(format!("invalid server name {host}: {e}")))?;

        // Connect and handshake share one budget
        let (tls_stream, handshake_time) = timeout(limit, async {
            let stream = TcpStream::connect(addrs)
                .await
                .map_err(|e| ProbeError::Connect(e.to_string()))?;

            let start = Instant::now();
            let tls_stream = self
                .connector
                .connect(server_name, stream)
                .await
                .map_err(|e| ProbeError::Tls(e.to_string()))?;
            Ok::<_, ProbeError>((tls_stream, start.elapsed()))
        })
        .await
        .map_err(|_| ProbeError::Timeout(limit))??;

        let (_, connection) = tls_stream.get_ref();
        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| ProbeError::Tls("peer sent no certificate".to_string()))?;

        let (_, certificate) = x509_parser::parse_x509_certificate(leaf.as_ref())
            .map_err(|e| ProbeError::Tls(format!("unparsable certificate: {e}")))?;

        let not_after = certificate.validity().not_after.timestamp();
        let certificate_expiry_days = days_until(not_after, Utc::now().timestamp());

        trace!("{host}: handshake {handshake_time:?}, certificate expires in {certificate_expiry_days} day(s)");

        Ok(TlsInfo {
            handshake_time,
            certificate_expiry_days,
        })
    }
}

/// Whole days from `now` until `not_after` (unix seconds), rounded up.
pub fn days_until(not_after: i64, now: i64) -> i64 {
    ((not_after - now) as f64 / SECONDS_PER_DAY).ceil() as i64
}
