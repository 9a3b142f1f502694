//! Shared TLS leaf-certificate inspection, used by the `https-cert`
//! executor and the `http` executor's `notifyCertExpiry` check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::timeout;
use x509_parser::prelude::{FromDer, X509Certificate};

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsCertError {
    HostNotFound,
    Timeout,
    TlsError,
    NetworkError,
}

impl std::fmt::Display for TlsCertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            TlsCertError::HostNotFound => "HOST_NOT_FOUND",
            TlsCertError::Timeout => "TIMEOUT",
            TlsCertError::TlsError => "TLS_ERROR",
            TlsCertError::NetworkError => "NETWORK_ERROR",
        };
        write!(f, "{code}")
    }
}

struct NoVerification;

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn client_config(ignore_tls: bool) -> Arc<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder();

    let config = if ignore_tls {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    Arc::new(config)
}

/// Opens a TLS connection to `host:port` and returns the leaf certificate's
/// validity window. Chain validation is performed by rustls unless
/// `ignore_tls` is set.
pub async fn fetch_leaf_cert(
    host: &str,
    port: u16,
    ignore_tls: bool,
    connect_timeout: Duration,
) -> Result<CertInfo, TlsCertError> {
    let connector = tokio_rustls::TlsConnector::from(client_config(ignore_tls));

    let tcp = timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| TlsCertError::Timeout)?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TlsCertError::HostNotFound,
            std::io::ErrorKind::TimedOut => TlsCertError::Timeout,
            _ => TlsCertError::NetworkError,
        })?;

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| TlsCertError::HostNotFound)?;

    let tls_stream = timeout(connect_timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| TlsCertError::Timeout)?
        .map_err(|_| TlsCertError::TlsError)?;

    let (_, session) = tls_stream.get_ref();
    let certs = session
        .peer_certificates()
        .ok_or(TlsCertError::TlsError)?;
    let leaf = certs.first().ok_or(TlsCertError::TlsError)?;

    let (_, parsed) =
        X509Certificate::from_der(leaf.as_ref()).map_err(|_| TlsCertError::TlsError)?;

    let not_before = DateTime::from_timestamp(parsed.validity().not_before.timestamp(), 0)
        .ok_or(TlsCertError::TlsError)?;
    let not_after = DateTime::from_timestamp(parsed.validity().not_after.timestamp(), 0)
        .ok_or(TlsCertError::TlsError)?;

    Ok(CertInfo {
        not_before,
        not_after,
    })
}

pub fn days_until(not_after: DateTime<Utc>) -> i64 {
    (not_after - Utc::now()).num_days()
}
