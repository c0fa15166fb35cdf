//! HTTP utilities for the PAN-OS connector.
//!
//! Every XML API call is a form-encoded POST to `/api/`. This module wraps a
//! `reqwest` client with timeout, TLS, authentication header and retry
//! handling so the PAN-OS layer only deals with XML.

use crate::traits::{AuthConfig, ConnectorConfig, ConnectorError, ConnectorResult, XmlTransport};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Path of the XML API on every PAN-OS management interface.
pub const API_PATH: &str = "/api/";

/// HTTP client with retry support.
pub struct HttpClient {
    client: Client,
    config: ConnectorConfig,
}

impl HttpClient {
    /// Creates a new HTTP client from connector configuration.
    pub fn new(config: ConnectorConfig) -> ConnectorResult<Self> {
        if !config.verify_tls {
            warn!(
                base_url = %config.base_url,
                connector_name = %config.name,
                "TLS certificate verification DISABLED - connection is vulnerable to MITM attacks"
            );
        }

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90));

        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &config.headers {
            if let (Ok(name), Ok(val)) = (
                reqwest::header::HeaderName::try_from(key.as_str()),
                reqwest::header::HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, val);
            }
        }
        builder = builder.default_headers(headers);

        let client = builder
            .build()
            .map_err(|e| ConnectorError::ConfigError(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Builds a URL from a path.
    pub fn build_url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Executes a form-encoded POST with retry logic.
    pub async fn post(&self, path: &str, params: &[(&str, &str)]) -> ConnectorResult<Response> {
        let url = self.build_url(path);
        let request = self.add_auth(self.client.post(&url).form(params));
        self.execute_with_retry(request).await
    }

    /// Executes a request with retries and error mapping.
    ///
    /// Transport failures and 5xx answers are retried with exponential
    /// backoff. 4xx answers are returned at once, except that a PAN-OS error
    /// document in the body is passed through so its message can be read.
    async fn execute_with_retry(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ConnectorResult<Response> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(250);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} after {:?}", attempt, delay);
                sleep(delay).await;
                let jitter = rand_jitter();
                delay = std::cmp::min(delay * 2 + jitter, Duration::from_secs(30));
            }

            let request_clone = request
                .try_clone()
                .ok_or_else(|| ConnectorError::Internal("Failed to clone request".to_string()))?;

            match request_clone.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_server_error() && attempt < self.config.max_retries {
                        warn!("Server error {}, retrying...", status);
                        last_error = Some(ConnectorError::RequestFailed(format!(
                            "Server error: {}",
                            status
                        )));
                        continue;
                    }

                    if status.is_client_error() {
                        return Self::client_error(response).await;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    last_error = Some(map_send_error(&e));
                    if attempt >= self.config.max_retries {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ConnectorError::Internal("Unknown error".to_string())))
    }

    async fn client_error(response: Response) -> ConnectorResult<Response> {
        let status = response.status();
        let is_xml = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("xml"));
        if is_xml {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ConnectorError::AuthenticationFailed(format!("HTTP {}", status)),
            ),
            StatusCode::NOT_FOUND => Err(ConnectorError::NotFound("Resource not found".into())),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ConnectorError::RequestFailed(format!(
                    "Client error {}: {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )))
            }
        }
    }

    fn add_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth {
            AuthConfig::None => request,
            AuthConfig::ApiKey { key, header_name } => {
                request.header(header_name, key.expose_secret())
            }
        }
    }
}

#[async_trait]
impl XmlTransport for HttpClient {
    fn endpoint(&self) -> &str {
        self.base_url()
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> ConnectorResult<String> {
        let response = self.post(API_PATH, params).await?;
        response
            .text()
            .await
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))
    }
}

fn map_send_error(e: &reqwest::Error) -> ConnectorError {
    if e.is_timeout() {
        ConnectorError::Timeout(e.to_string())
    } else if e.is_connect() {
        ConnectorError::ConnectionFailed(e.to_string())
    } else {
        ConnectorError::RequestFailed(e.to_string())
    }
}

/// Generate a small random jitter for exponential backoff.
fn rand_jitter() -> Duration {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::time::Instant::now().hash(&mut hasher);
    let jitter_ms = hasher.finish() % 100;
    Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_connector_config;

    #[test]
    fn test_build_url() {
        let client = HttpClient::new(test_connector_config("fw", "https://10.0.1.1/")).unwrap();

        assert_eq!(client.build_url(API_PATH), "https://10.0.1.1/api/");
        assert_eq!(client.build_url("api/"), "https://10.0.1.1/api/");
    }

    #[test]
    fn test_client_without_tls_verification() {
        let mut config = test_connector_config("fw", "https://10.0.1.1");
        config.verify_tls = false;
        assert!(HttpClient::new(config).is_ok());
    }

    #[test]
    fn test_jitter_is_bounded() {
        for _ in 0..10 {
            assert!(rand_jitter() < Duration::from_millis(100));
        }
    }
}
