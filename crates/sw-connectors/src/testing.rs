//! Testing harness for the PAN-OS connector.
//!
//! Provides a scripted transport that answers requests with canned XML and
//! records what was sent.

use crate::traits::{AuthConfig, ConnectorConfig, ConnectorError, ConnectorResult, XmlTransport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Creates a test connector config with sensible defaults.
pub fn test_connector_config(name: &str, base_url: &str) -> ConnectorConfig {
    ConnectorConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        auth: AuthConfig::None,
        timeout_secs: 30,
        max_retries: 0,
        verify_tls: true,
        headers: HashMap::new(),
    }
}

/// Answers each request with the next queued body.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    answers: Arc<Mutex<VecDeque<ConnectorResult<String>>>>,
    requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl ScriptedTransport {
    pub fn new<S: AsRef<str>>(answers: &[S]) -> Self {
        let transport = Self::default();
        for answer in answers {
            transport.push(answer.as_ref());
        }
        transport
    }

    pub fn push(&self, body: &str) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Ok(body.to_string()));
    }

    pub fn push_error(&self, err: ConnectorError) {
        self.answers.lock().unwrap().push_back(Err(err));
    }

    /// Form parameters of every request sent so far.
    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl XmlTransport for ScriptedTransport {
    fn endpoint(&self) -> &str {
        "https://scripted.test"
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> ConnectorResult<String> {
        self.requests.lock().unwrap().push(
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ConnectorError::ConnectionFailed("no scripted answer".into())))
    }
}

/// Wraps a `result` body in a successful `<response>`.
pub fn success(result: &str) -> String {
    format!(r#"<response status="success"><result>{}</result></response>"#, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_connector_config() {
        let config = test_connector_config("test", "https://10.0.0.10");
        assert_eq!(config.name, "test");
        assert_eq!(config.base_url, "https://10.0.0.10");
        assert!(matches!(config.auth, AuthConfig::None));
    }

    #[tokio::test]
    async fn test_scripted_transport_runs_dry() {
        let transport = ScriptedTransport::new(&["<a/>"]);
        assert_eq!(transport.post_form(&[("type", "op")]).await.unwrap(), "<a/>");
        assert!(transport.post_form(&[]).await.is_err());
        assert_eq!(transport.requests().len(), 2);
    }
}
