//! Probe module for endpoint health checks.
//!
//! A probe issues one HTTP GET, classifies the response and, for https
//! targets, reads the expiry of the served TLS leaf certificate.

mod http;
mod tls;

pub use http::*;
pub use tls::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),
}

/// What a single probe needs to know about its target.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub url: String,
    pub expected_content: String,
}

impl ProbeTarget {
    pub fn new(url: &str, expected_content: &str) -> Self {
        Self {
            url: url.to_string(),
            expected_content: expected_content.to_string(),
        }
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    pub ok: bool,
    pub status_code: Option<u16>,
    /// Unset when no response was received.
    pub latency_ms: Option<u64>,
    pub content_matched: bool,
    pub ssl_expiry: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ProbeResult {
    /// A failure before any response arrived.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Something that can check one target. Implementations hold no per-target
/// state and may be called concurrently.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> ProbeResult;
}

/// TLS handshake budget derived from the total request timeout.
pub fn handshake_timeout(total: Duration) -> Duration {
    total / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_timeout_is_half() {
        assert_eq!(handshake_timeout(Duration::from_secs(10)), Duration::from_secs(5));
        assert_eq!(handshake_timeout(Duration::from_millis(3)), Duration::from_micros(1500));
    }

    #[test]
    fn test_failed_result() {
        let result = ProbeResult::failed("connection refused");
        assert!(!result.ok);
        assert_eq!(result.latency_ms, None);
        assert_eq!(result.error_message.as_deref(), Some("connection refused"));
    }
}
