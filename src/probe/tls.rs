//! TLS leaf-certificate inspection.
//!
//! Opens a dedicated TLS connection to port 443 of the target host and reads
//! the expiry of the certificate it presents.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::{Host, Url};

use super::ProbeError;

const TLS_PORT: u16 = 443;

/// Host part of an https URL, ready for dialing and SNI.
#[derive(Debug, Clone, PartialEq)]
pub struct TlsHost {
    /// Hostname or bare IP literal (no brackets, no port).
    pub host: String,
    pub server_name: ServerName<'static>,
}

/// Extract the TLS host of `url`. Returns `None` unless the scheme is https.
pub fn tls_host(url: &str) -> Option<TlsHost> {
    let parsed = Url::parse(url).ok()?;
    if parsed.scheme() != "https" {
        return None;
    }

    match parsed.host()? {
        Host::Domain(domain) => Some(TlsHost {
            host: domain.to_string(),
            server_name: ServerName::try_from(domain.to_string()).ok()?,
        }),
        Host::Ipv4(ip) => Some(ip_host(IpAddr::V4(ip))),
        Host::Ipv6(ip) => Some(ip_host(IpAddr::V6(ip))),
    }
}

fn ip_host(ip: IpAddr) -> TlsHost {
    TlsHost {
        host: ip.to_string(),
        server_name: ServerName::IpAddress(ip.into()),
    }
}

/// Reads certificate expiry dates over short-lived TLS connections.
pub struct TlsInspector {
    connector: TlsConnector,
    timeout: Duration,
    port: u16,
}

impl TlsInspector {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let mut roots = RootCertStore::empty();
        match rustls_native_certs::load_native_certs() {
            Ok(certs) => {
                let (added, ignored) = roots.add_parsable_certificates(certs);
                tracing::debug!("Loaded {} native root certificates ({} ignored)", added, ignored);
            }
            Err(e) => tracing::warn!("Failed to load native root certificates: {}", e),
        }

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self::with_config(config, timeout, TLS_PORT))
    }

    fn with_config(config: ClientConfig, timeout: Duration, port: u16) -> Self {
        Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
            port,
        }
    }

    /// Expiry of the leaf certificate served for `url`.
    ///
    /// `None` for non-https URLs and for any dial or handshake failure.
    pub async fn leaf_expiry(&self, url: &str) -> Option<DateTime<Utc>> {
        let host = tls_host(url)?;
        match self.fetch_leaf_expiry(&host).await {
            Ok(expiry) => Some(expiry),
            Err(e) => {
                tracing::debug!("TLS inspection of {} failed: {}", host.host, e);
                None
            }
        }
    }

    async fn fetch_leaf_expiry(&self, host: &TlsHost) -> Result<DateTime<Utc>, ProbeError> {
        let handshake = async {
            let tcp = TcpStream::connect((host.host.as_str(), self.port)).await?;
            let stream = self
                .connector
                .connect(host.server_name.clone(), tcp)
                .await?;

            let (_, session) = stream.get_ref();
            let leaf = session
                .peer_certificates()
                .and_then(|certs| certs.first())
                .ok_or_else(|| ProbeError::Tls("no peer certificate presented".to_string()))?;

            certificate_expiry(leaf.as_ref())
        };

        tokio::time::timeout(self.timeout, handshake)
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
    }
}

/// `notAfter` of a DER-encoded X.509 certificate.
pub fn certificate_expiry(der: &[u8]) -> Result<DateTime<Utc>, ProbeError> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|e| ProbeError::Tls(e.to_string()))?;

    let ts = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| ProbeError::Tls(format!("certificate expiry {} out of range", ts)))
}
