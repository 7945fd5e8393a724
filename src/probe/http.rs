//! HTTP probe implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{handshake_timeout, Probe, ProbeError, ProbeResult, ProbeTarget, TlsInspector};

/// Probes targets with a shared HTTP client.
pub struct HttpProber {
    client: reqwest::Client,
    tls: TlsInspector,
}

impl HttpProber {
    /// Build a prober whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(handshake_timeout(timeout))
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        tracing::debug!("HTTP probe timeout set to {:?}", timeout);

        Ok(Self {
            client,
            tls: TlsInspector::new(handshake_timeout(timeout))?,
        })
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeResult {
        let start = Instant::now();

        let response = match self.client.get(&target.url).send().await {
            Ok(r) => r,
            Err(e) => return ProbeResult::failed(format!("Failed to get server status: {}", e)),
        };

        let mut result = ProbeResult {
            status_code: Some(response.status().as_u16()),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            ..Default::default()
        };

        if !response.status().is_success() {
            result.error_message = Some(format!(
                "Status code {} is not successful",
                response.status().as_u16()
            ));
            return result;
        }

        if !target.expected_content.is_empty() {
            let body = match response.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    result.error_message = Some(format!("Failed to read response body: {}", e));
                    return result;
                }
            };

            if !String::from_utf8_lossy(&body).contains(&target.expected_content) {
                result.error_message = Some("Expected content not found in response".to_string());
                return result;
            }
            result.content_matched = true;
        }

        result.ssl_expiry = self.tls.leaf_expiry(&target.url).await;
        result.ok = true;
        result
    }
}
