//! Upstream proxy client.
//!
//! Forwards requests the gateway does not answer locally to the upstream
//! generation service. One client request maps to exactly one upstream
//! attempt; generation calls are not idempotent-safe to repeat, so there is
//! no retry policy here. The shared `reqwest::Client` releases its connection
//! on every exit path, including when the relayed stream is dropped by a
//! disconnecting caller.

use crate::error::GatewayError;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use serde_json::Value;
use std::{pin::Pin, time::Duration};
use tracing::{debug, warn};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>;

/// Outcome of one proxied call. Timeout and connection failure render the
/// same on the wire; they stay distinct here for logging.
#[derive(Debug)]
pub enum ProxyOutcome {
    /// HTTP 200; the upstream JSON body passes through to the caller
    /// unchanged.
    Ok(Value),
    Timeout,
    ConnectionError,
    UpstreamError { status: u16, detail: String },
}

#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    base: String,
}

impl ProxyClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Forward one non-streaming request. The upstream is assumed to speak
    /// the caller's wire dialect already, so a 200 body is never
    /// reinterpreted.
    pub async fn forward_json(&self, path: &str, body: &Value) -> ProxyOutcome {
        let url = format!("{}{}", self.base, path);
        debug!("proxying request to {}", url);

        let response = match self.client.post(&url).json(body).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                warn!("proxy timeout for {}: {}", url, err);
                return ProxyOutcome::Timeout;
            }
            Err(err) => {
                warn!("proxy connection failure for {}: {}", url, err);
                return ProxyOutcome::ConnectionError;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("upstream returned HTTP {} for {}", status.as_u16(), url);
            return ProxyOutcome::UpstreamError {
                status: status.as_u16(),
                detail: detail.chars().take(200).collect(),
            };
        }

        match response.json::<Value>().await {
            Ok(value) => ProxyOutcome::Ok(value),
            Err(err) if err.is_timeout() => {
                warn!("proxy timeout reading body from {}: {}", url, err);
                ProxyOutcome::Timeout
            }
            Err(err) => {
                warn!("invalid upstream body from {}: {}", url, err);
                ProxyOutcome::UpstreamError {
                    status: status.as_u16(),
                    detail: format!("invalid upstream body: {}", err),
                }
            }
        }
    }

    /// Open one upstream streaming connection and relay its raw byte chunks,
    /// preserving order. Errors before the first byte surface as `Err`;
    /// failures mid-stream surface as an `Err` item inside the stream so the
    /// adapter can inject one protocol error chunk and terminate.
    pub async fn forward_stream(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<ByteStream, GatewayError> {
        let url = format!("{}{}", self.base, path);
        debug!("proxying streaming request to {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(GatewayError::from)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream(format!(
                "upstream returned HTTP {}: {}",
                status.as_u16(),
                detail.chars().take(200).collect::<String>()
            )));
        }

        Ok(Box::pin(
            response.bytes_stream().map_err(GatewayError::from),
        ))
    }

    /// Best-effort reachability probe for health reporting. Never gates
    /// startup; failure is reported, not propagated.
    pub async fn check_reachable(&self) -> bool {
        let url = format!("{}/api/tags", self.base);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("upstream reachability check failed: {}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_for(base: &str) -> ProxyClient {
        ProxyClient::new(base, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn base_url_is_normalized() {
        let client = client_for("http://localhost:11434/");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_connection_error() {
        // Port 1 on loopback refuses immediately.
        let client = client_for("http://127.0.0.1:1");
        let outcome = client
            .forward_json("/api/chat", &json!({"model": "m"}))
            .await;
        assert!(matches!(
            outcome,
            ProxyOutcome::ConnectionError | ProxyOutcome::Timeout
        ));
    }

    #[tokio::test]
    async fn unreachable_upstream_fails_stream_before_first_byte() {
        let client = client_for("http://127.0.0.1:1");
        let result = client
            .forward_stream("/api/chat", &json!({"model": "m"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reachability_check_reports_false_without_upstream() {
        let client = client_for("http://127.0.0.1:1");
        assert!(!client.check_reachable().await);
    }
}
