//! Connector error, configuration, and transport definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sw_core::{ManagementError, SecureString};
use thiserror::Error;

/// Errors that can occur while talking to a PAN-OS device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The device answered `status="error"`.
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

impl From<ConnectorError> for ManagementError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::AuthenticationFailed(m) => ManagementError::Authentication(m),
            ConnectorError::ConnectionFailed(m) | ConnectorError::ConfigError(m) => {
                ManagementError::Connection(m)
            }
            ConnectorError::Timeout(m) => ManagementError::Timeout(m),
            ConnectorError::NotFound(m) => ManagementError::NotFound(m),
            ConnectorError::InvalidResponse(m) => ManagementError::MalformedResponse(m),
            ConnectorError::ApiError(m)
            | ConnectorError::RequestFailed(m)
            | ConnectorError::Internal(m) => ManagementError::Api(m),
        }
    }
}

/// Configuration for a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector name/identifier.
    pub name: String,
    /// Base URL of the management interface, e.g. `https://10.0.0.10`.
    pub base_url: String,
    pub auth: AuthConfig,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries for transport failures and 5xx answers.
    pub max_retries: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
    /// Additional headers to include.
    pub headers: HashMap<String, String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication (key generation).
    None,
    /// API key sent in a header.
    ApiKey {
        /// The API key (zeroized on drop).
        key: SecureString,
        header_name: String,
    },
}

/// Posts a form to the device's `/api/` endpoint and returns the raw body.
///
/// [`crate::http::HttpClient`] is the production transport; tests script
/// canned XML answers instead.
#[async_trait]
pub trait XmlTransport: Send + Sync {
    /// Base URL requests are sent to.
    fn endpoint(&self) -> &str;

    async fn post_form(&self, params: &[(&str, &str)]) -> ConnectorResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err: ManagementError = ConnectorError::AuthenticationFailed("403".into()).into();
        assert_eq!(err, ManagementError::Authentication("403".into()));

        let err: ManagementError = ConnectorError::InvalidResponse("no result".into()).into();
        assert!(matches!(err, ManagementError::MalformedResponse(_)));

        let err: ManagementError = ConnectorError::ApiError("Object doesn't exist".into()).into();
        assert!(matches!(err, ManagementError::Api(_)));
    }

    #[test]
    fn test_auth_config_redacts_key() {
        let auth = AuthConfig::ApiKey {
            key: SecureString::from("LUFRPT1secret"),
            header_name: "X-PAN-KEY".to_string(),
        };
        assert!(!format!("{:?}", auth).contains("LUFRPT1secret"));
    }
}
