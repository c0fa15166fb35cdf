//! PAN-OS policy manager and session factory.
//!
//! [`PanosConnector`] is one live session with a firewall or Panorama node and
//! implements the engine's [`PolicyManager`] seam over the XML API.
//! [`PanosSessionFactory`] opens such sessions and mints API keys for the
//! connection resolver.

use super::client::PanosApi;
use super::ops::{self, SHOW_DEVICE_GROUPS, SHOW_HA_STATE, SHOW_SYSTEM_INFO};
use super::rules::{description_element, parse_rules, tag_element};
use super::xpath;
use crate::http::HttpClient;
use crate::traits::{AuthConfig, ConnectorConfig, ConnectorResult, XmlTransport};
use crate::xml::escape;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use sw_core::shadow::text_of;
use sw_core::{
    ClusterKind, Credentials, DeviceGroup, Endpoint, HaState, ManagementResult, PolicyManager,
    Rule, RuleRepository, SecureString, SessionFactory, TagObject, TagOutcome,
};
use tracing::{debug, info, instrument};

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "X-PAN-KEY";
/// Request timeout for firewalls when none is configured.
pub const FIREWALL_TIMEOUT_SECS: u64 = 5;
/// Request timeout for Panorama when none is configured.
pub const PANORAMA_TIMEOUT_SECS: u64 = 120;

/// Default request timeout for a cluster kind.
pub fn default_timeout(kind: ClusterKind) -> u64 {
    match kind {
        ClusterKind::Firewall => FIREWALL_TIMEOUT_SECS,
        ClusterKind::Panorama => PANORAMA_TIMEOUT_SECS,
    }
}

/// PAN-OS connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanosConfig {
    /// Base connector configuration.
    #[serde(flatten)]
    pub connector: ConnectorConfig,
    /// Management address of the node.
    pub hostname: String,
    pub kind: ClusterKind,
}

impl PanosConfig {
    /// Builds the configuration for an endpoint, with or without its key.
    pub fn for_endpoint(
        kind: ClusterKind,
        endpoint: &Endpoint,
        verify_tls: bool,
        max_retries: u32,
        with_key: bool,
    ) -> Self {
        let auth = match (&endpoint.api_key, with_key) {
            (Some(key), true) => AuthConfig::ApiKey {
                key: key.clone(),
                header_name: API_KEY_HEADER.to_string(),
            },
            _ => AuthConfig::None,
        };
        Self {
            connector: ConnectorConfig {
                name: endpoint.address.clone(),
                base_url: format!("https://{}", endpoint.address),
                auth,
                timeout_secs: endpoint.timeout_secs.unwrap_or_else(|| default_timeout(kind)),
                max_retries,
                verify_tls,
                headers: HashMap::new(),
            },
            hostname: endpoint.address.clone(),
            kind,
        }
    }
}

/// Live session with one PAN-OS node.
pub struct PanosConnector {
    hostname: String,
    kind: ClusterKind,
    api: PanosApi,
}

impl PanosConnector {
    /// Creates a connector talking HTTPS to the configured node.
    pub fn new(config: PanosConfig) -> ConnectorResult<Self> {
        let client = HttpClient::new(config.connector)?;
        debug!("PAN-OS connector initialized for '{}'", config.hostname);
        Ok(Self::with_transport(
            config.hostname,
            config.kind,
            Box::new(client),
        ))
    }

    /// Creates a connector over an arbitrary transport.
    pub fn with_transport(
        hostname: impl Into<String>,
        kind: ClusterKind,
        transport: Box<dyn XmlTransport>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            kind,
            api: PanosApi::new(transport),
        }
    }

    /// Runs `show system info`; used to check reachability and the key.
    pub async fn system_info(&self) -> ConnectorResult<Value> {
        self.api.op(SHOW_SYSTEM_INFO).await
    }
}

#[async_trait]
impl RuleRepository for PanosConnector {
    #[instrument(skip(self), fields(host = %self.hostname))]
    async fn fetch_rules(&self, device_group: &str) -> ManagementResult<Vec<Rule>> {
        let mut rules = Vec::new();
        for &position in xpath::positions(self.kind) {
            let result = self
                .api
                .get(&xpath::security_rules(self.kind, device_group, position))
                .await?;
            let parsed = parse_rules(&result, position)?;
            debug!("Fetched {} {} rules", parsed.len(), position);
            rules.extend(parsed);
        }
        Ok(rules)
    }

    #[instrument(skip(self, rule), fields(host = %self.hostname, rule = %rule.name))]
    async fn apply_rule(&self, device_group: &str, rule: &Rule) -> ManagementResult<()> {
        let entry = xpath::rule_entry(self.kind, device_group, rule.position, &rule.name);
        if let Some(tags) = &rule.tags {
            self.api
                .edit(&format!("{}/tag", entry), &tag_element(tags))
                .await?;
        }
        if let Some(comment) = &rule.comment {
            self.api
                .edit(
                    &format!("{}/description", entry),
                    &description_element(comment),
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyManager for PanosConnector {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn kind(&self) -> ClusterKind {
        self.kind
    }

    async fn ha_state(&self) -> ManagementResult<HaState> {
        let result = self.api.op(SHOW_HA_STATE).await?;
        Ok(ops::parse_ha_state(&result)?)
    }

    async fn device_groups(&self) -> ManagementResult<Vec<DeviceGroup>> {
        let groups = match self.kind {
            ClusterKind::Panorama => {
                ops::parse_device_groups(&self.api.op(SHOW_DEVICE_GROUPS).await?)?
            }
            ClusterKind::Firewall => ops::parse_vsys(&self.api.get(&xpath::vsys_list()).await?)?,
        };
        Ok(groups)
    }

    async fn run_op(&self, cmd: &str) -> ManagementResult<Value> {
        Ok(self.api.op(cmd).await?)
    }

    #[instrument(skip(self, tag), fields(host = %self.hostname, tag = %tag.name))]
    async fn ensure_tag(&self, device_group: &str, tag: &TagObject) -> TagOutcome {
        let entry = xpath::tag_entry(self.kind, device_group, &tag.name);
        match self.api.get(&entry).await {
            Ok(result) if result.get("entry").is_some() => return TagOutcome::AlreadyExists,
            Ok(_) => {}
            Err(e) => return TagOutcome::Failed(e.into()),
        }

        let element = format!("<comments>{}</comments>", escape(&tag.comment));
        match self.api.set(&entry, &element).await {
            Ok(_) => TagOutcome::Created,
            Err(e) => TagOutcome::Failed(e.into()),
        }
    }
}

/// Opens [`PanosConnector`] sessions over HTTPS.
#[derive(Debug, Clone)]
pub struct PanosSessionFactory {
    pub verify_tls: bool,
    pub max_retries: u32,
}

impl Default for PanosSessionFactory {
    fn default() -> Self {
        Self {
            verify_tls: true,
            max_retries: 2,
        }
    }
}

#[async_trait]
impl SessionFactory for PanosSessionFactory {
    async fn open(
        &self,
        kind: ClusterKind,
        endpoint: &Endpoint,
    ) -> ManagementResult<Arc<dyn PolicyManager>> {
        let config =
            PanosConfig::for_endpoint(kind, endpoint, self.verify_tls, self.max_retries, true);
        let connector = PanosConnector::new(config)?;
        let info = connector.system_info().await?;
        info!(
            "Connected to {} ({} {}, PAN-OS {})",
            endpoint.address,
            info.pointer("/system/hostname").and_then(text_of).unwrap_or("?"),
            info.pointer("/system/model").and_then(text_of).unwrap_or("?"),
            info.pointer("/system/sw-version").and_then(text_of).unwrap_or("?"),
        );
        Ok(Arc::new(connector))
    }

    async fn generate_api_key(
        &self,
        kind: ClusterKind,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> ManagementResult<SecureString> {
        let config =
            PanosConfig::for_endpoint(kind, endpoint, self.verify_tls, self.max_retries, false);
        let api = PanosApi::new(Box::new(HttpClient::new(config.connector)?));
        Ok(api
            .keygen(&credentials.username, &credentials.password)
            .await?)
    }
}
