//! HTTP client for the upstream Bazaar discovery registry.
//!
//! [`BazaarClient`] fetches the full registry snapshot and validates its
//! shape. It does not retry, cache, or filter; each call produces a fresh
//! [`DiscoveryResponse`] that the caller owns outright.

use b402::proto::DiscoveryResponse;
use http::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};

use crate::constants::{DEFAULT_REGISTRY_URL, DISCOVERY_RESOURCES_PATH};

/// Errors fetching or validating a discovery snapshot.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The registry could not be reached at all.
    #[error("discovery registry unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// The registry answered with a non-success status.
    #[error("discovery registry returned {status}")]
    UpstreamStatus {
        /// The status the registry returned.
        status: StatusCode,
        /// The response body, for diagnostics.
        body: String,
    },

    /// The payload does not conform to the snapshot shape.
    #[error("discovery snapshot failed validation: {0}")]
    Schema(#[from] serde_json::Error),
}

/// Async HTTP client for the Bazaar registry.
#[derive(Debug, Clone)]
pub struct BazaarClient {
    base_url: String,
    client: reqwest::Client,
}

impl Default for BazaarClient {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_URL)
    }
}

impl BazaarClient {
    /// Creates a client for the registry at `base_url` (without a trailing
    /// slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Replaces the underlying HTTP client, e.g. to configure a timeout at
    /// the boundary.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Returns the registry base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches a fresh snapshot of every discoverable service.
    ///
    /// Validation is strict on required fields (`resource` and `accepts`
    /// per item) and permissive on unknown ones, which are preserved in the
    /// parsed result.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Unreachable`] or
    /// [`DiscoveryError::UpstreamStatus`] when the registry call fails, and
    /// [`DiscoveryError::Schema`] when the payload is malformed.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "bazaar.fetch_snapshot", skip(self), fields(url = %self.base_url))
    )]
    pub async fn fetch_snapshot(&self) -> Result<DiscoveryResponse, DiscoveryError> {
        let response = self
            .client
            .get(format!("{}{DISCOVERY_RESOURCES_PATH}", self.base_url))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::UpstreamStatus { status, body });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snapshot_body() -> serde_json::Value {
        json!({
            "x402Version": 1,
            "items": [{
                "resource": "https://api.example.com/weather",
                "type": "http",
                "accepts": [{
                    "scheme": "exact",
                    "network": "base",
                    "asset": "0xUSDC",
                    "maxAmountRequired": "1000"
                }]
            }],
            "pagination": {"limit": 100, "offset": 0, "total": 1},
            "nextEpoch": "preserved"
        })
    }

    #[tokio::test]
    async fn fetches_and_validates_a_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/resources"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = BazaarClient::new(server.uri()).fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].resource, "https://api.example.com/weather");
        assert_eq!(snapshot.rest["nextEpoch"], json!("preserved"));
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/resources"))
            .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
            .mount(&server)
            .await;

        let client = BazaarClient::new(format!("{}/", server.uri()));
        assert!(client.fetch_snapshot().await.is_ok());
    }

    #[tokio::test]
    async fn non_success_status_is_an_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/resources"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let err = BazaarClient::new(server.uri()).fetch_snapshot().await.unwrap_err();
        match err {
            DiscoveryError::UpstreamStatus { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "down");
            }
            other => panic!("expected UpstreamStatus, got {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_registry_is_an_upstream_error() {
        let err = BazaarClient::new("http://127.0.0.1:1")
            .fetch_snapshot()
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Unreachable(_)), "{err}");
    }

    #[tokio::test]
    async fn item_missing_resource_is_a_schema_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/resources"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"items": [{"accepts": []}]})),
            )
            .mount(&server)
            .await;

        let err = BazaarClient::new(server.uri()).fetch_snapshot().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Schema(_)), "{err}");
    }

    #[tokio::test]
    async fn non_json_payload_is_a_schema_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/resources"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = BazaarClient::new(server.uri()).fetch_snapshot().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Schema(_)), "{err}");
    }
}
