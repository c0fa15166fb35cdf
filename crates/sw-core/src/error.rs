//! Error types shared by the policy-hygiene engine.

use thiserror::Error;

/// Errors surfaced by a management session (firewall or Panorama).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagementError {
    /// The endpoint could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The API key or credentials were rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The management server answered with an error status.
    #[error("API error: {0}")]
    Api(String),

    /// The response did not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The requested object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The call timed out.
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Result type for management operations.
pub type ManagementResult<T> = Result<T, ManagementError>;

/// Errors raised while resolving the active endpoint of a cluster.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Minting an API key failed. The caller should treat this as fatal.
    #[error("Credential generation failed for {address}: {reason}")]
    Credential { address: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_management_error_display() {
        let err = ManagementError::Connection("10.0.0.1".to_string());
        assert!(err.to_string().contains("10.0.0.1"));

        let err = ManagementError::MalformedResponse("missing result".to_string());
        assert!(err.to_string().starts_with("Malformed response"));
    }

    #[test]
    fn test_resolve_error_display() {
        let err = ResolveError::Credential {
            address: "panorama-1".to_string(),
            reason: "Invalid credentials".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("panorama-1"));
        assert!(text.contains("Invalid credentials"));
    }
}
