//! Transport seam and the reqwest-backed implementation.

use async_trait::async_trait;
use playkit_core::{HttpMethod, Payload};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Transport error type.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Network-level failure
    #[error("network error: {0}")]
    Network(String),
}

/// Raw result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl Response {
    /// 2xx-class result.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The service rejected the call for lack of a usable session.
    /// These attempts are deferrals, not failures: they never count
    /// against the retry ceiling.
    pub fn is_auth_required(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

/// One remote call, synchronous from the worker's point of view: the
/// worker blocks its own task on this future, keeping the pipeline
/// single-concurrency.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
        payload: &Payload,
    ) -> Result<Response, TransportError>;
}

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL for the reporting API.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.playkit.dev".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Transport over reqwest. GET payloads become query parameters, POST
/// payloads are sent as a JSON body.
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with its own connection pool.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
        payload: &Payload,
    ) -> Result<Response, TransportError> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        debug!(url = %url, method = method.as_str(), "Executing request");

        let builder = match method {
            HttpMethod::Get => {
                let query: Vec<(String, String)> = payload
                    .iter()
                    .map(|(k, v)| (k.clone(), query_value(v)))
                    .collect();
                self.client.get(&url).query(&query)
            }
            HttpMethod::Post => self.client.post(&url).json(payload),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(Response { status, body })
    }
}

/// Render a JSON value as a query-string parameter.
fn query_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_classification() {
        let ok = Response { status: 201, body: vec![] };
        assert!(ok.is_success());
        assert!(!ok.is_auth_required());

        let unauthorized = Response { status: 401, body: vec![] };
        assert!(!unauthorized.is_success());
        assert!(unauthorized.is_auth_required());

        let forbidden = Response { status: 403, body: vec![] };
        assert!(forbidden.is_auth_required());

        let server_error = Response { status: 503, body: vec![] };
        assert!(!server_error.is_success());
        assert!(!server_error.is_auth_required());
    }

    #[test]
    fn test_query_value_rendering() {
        assert_eq!(query_value(&serde_json::Value::String("abc".into())), "abc");
        assert_eq!(query_value(&serde_json::json!(42)), "42");
        assert_eq!(query_value(&serde_json::json!(true)), "true");
    }

    #[test]
    fn test_transport_config_default() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.base_url, "https://api.playkit.dev");
    }
}
