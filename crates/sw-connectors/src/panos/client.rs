//! Request layer of the PAN-OS XML API.
//!
//! Builds `type=keygen|op|config` form requests, decodes the XML answer and
//! turns `<response status="error">` into a [`ConnectorError`].

use crate::traits::{ConnectorError, ConnectorResult, XmlTransport};
use crate::xml::parse_document;
use serde_json::Value;
use sw_core::shadow::{as_list, text_of};
use sw_core::SecureString;
use tracing::{debug, instrument};

/// PAN-OS error code for an invalid or expired API key.
const CODE_UNAUTHORIZED: &str = "403";
/// PAN-OS error code for "object not present".
const CODE_OBJECT_NOT_PRESENT: &str = "7";

/// Thin request wrapper over an [`XmlTransport`].
pub struct PanosApi {
    transport: Box<dyn XmlTransport>,
}

impl PanosApi {
    pub fn new(transport: Box<dyn XmlTransport>) -> Self {
        Self { transport }
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Exchanges a username and password for an API key.
    #[instrument(skip(self, password), fields(endpoint = %self.endpoint()))]
    pub async fn keygen(&self, user: &str, password: &SecureString) -> ConnectorResult<SecureString> {
        let result = self
            .request(&[
                ("type", "keygen"),
                ("user", user),
                ("password", password.expose_secret()),
            ])
            .await?;
        result
            .get("key")
            .and_then(text_of)
            .filter(|key| !key.is_empty())
            .map(SecureString::from)
            .ok_or_else(|| ConnectorError::InvalidResponse("keygen answer has no key".into()))
    }

    /// Runs an operational command given as XML.
    #[instrument(skip(self), fields(endpoint = %self.endpoint()))]
    pub async fn op(&self, cmd: &str) -> ConnectorResult<Value> {
        self.request(&[("type", "op"), ("cmd", cmd)]).await
    }

    /// Reads the candidate configuration at `xpath`.
    #[instrument(skip(self), fields(endpoint = %self.endpoint()))]
    pub async fn get(&self, xpath: &str) -> ConnectorResult<Value> {
        self.config("get", xpath, None).await
    }

    /// Merges `element` into the node at `xpath`, creating it if needed.
    #[instrument(skip(self, element), fields(endpoint = %self.endpoint()))]
    pub async fn set(&self, xpath: &str, element: &str) -> ConnectorResult<Value> {
        self.config("set", xpath, Some(element)).await
    }

    /// Replaces the node at `xpath` with `element`.
    #[instrument(skip(self, element), fields(endpoint = %self.endpoint()))]
    pub async fn edit(&self, xpath: &str, element: &str) -> ConnectorResult<Value> {
        self.config("edit", xpath, Some(element)).await
    }

    async fn config(&self, action: &str, xpath: &str, element: Option<&str>) -> ConnectorResult<Value> {
        let mut params = vec![("type", "config"), ("action", action), ("xpath", xpath)];
        if let Some(element) = element {
            params.push(("element", element));
        }
        self.request(&params).await
    }

    /// Sends one request and returns the `result` node of a successful answer.
    async fn request(&self, params: &[(&str, &str)]) -> ConnectorResult<Value> {
        let body = self.transport.post_form(params).await?;
        let document = parse_document(&body)?;
        let response = document.get("response").ok_or_else(|| {
            ConnectorError::InvalidResponse(format!(
                "missing <response> element: {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;
        check_status(response)?;
        debug!("API request succeeded");
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Maps a `<response>` node to success or the matching error.
pub fn check_status(response: &Value) -> ConnectorResult<()> {
    match response.get("@status").and_then(Value::as_str) {
        Some("success") => Ok(()),
        Some("error") => {
            let message = error_message(response);
            match response.get("@code").and_then(Value::as_str) {
                Some(CODE_UNAUTHORIZED) => Err(ConnectorError::AuthenticationFailed(message)),
                Some(CODE_OBJECT_NOT_PRESENT) => Err(ConnectorError::NotFound(message)),
                _ => Err(ConnectorError::ApiError(message)),
            }
        }
        other => Err(ConnectorError::InvalidResponse(format!(
            "unexpected response status {:?}",
            other
        ))),
    }
}

/// Collects the `msg` text of an error answer. It sits either directly under
/// `<response>` or under `<result>`, as plain text or as `<line>` elements.
fn error_message(response: &Value) -> String {
    let msg = response
        .get("msg")
        .or_else(|| response.get("result").and_then(|r| r.get("msg")));
    let Some(msg) = msg else {
        return "unknown error".to_string();
    };
    if let Some(text) = text_of(msg) {
        return text.to_string();
    }
    let lines: Vec<&str> = msg
        .get("line")
        .map(|l| as_list(l).into_iter().filter_map(text_of).collect())
        .unwrap_or_default();
    if lines.is_empty() {
        msg.to_string()
    } else {
        lines.join(" ")
    }
}
