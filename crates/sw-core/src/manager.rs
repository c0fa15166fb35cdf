//! Interfaces to a live management session.
//!
//! The engine talks to firewalls and Panorama only through these traits.
//! `sw-connectors` implements them over the PAN-OS XML API and
//! [`crate::mock::MockPolicyManager`] implements them in memory.

use crate::error::{ManagementError, ManagementResult};
use crate::rule::Rule;
use async_trait::async_trait;
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of management server a cluster is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    Firewall,
    Panorama,
}

/// High-availability state reported by a node about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaState {
    /// HA is not enabled on this node.
    Disabled,
    Active,
    Passive,
    /// Suspended, initial, non-functional, tentative, ...
    Other(String),
}

impl HaState {
    /// Parses a PAN-OS local state string (`active`, `primary-active`,
    /// `passive`, `secondary-passive`, `suspended`, ...).
    pub fn from_local_state(state: &str) -> Self {
        let state = state.trim().to_ascii_lowercase();
        if state.contains("active") {
            HaState::Active
        } else if state.contains("passive") {
            HaState::Passive
        } else {
            HaState::Other(state)
        }
    }

    /// Whether a node in this state can serve as the cluster's active handle.
    pub fn serves_traffic(&self) -> bool {
        matches!(self, HaState::Active | HaState::Disabled)
    }
}

/// Where shadow warnings are counted within a device group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShadowTarget {
    /// A Panorama-managed device, by serial number.
    Device(String),
    /// A firewall virtual system.
    Vsys(String),
}

impl ShadowTarget {
    /// XML selector element used inside shadow-warning operational commands.
    pub fn selector_xml(&self) -> String {
        match self {
            ShadowTarget::Device(serial) => {
                format!("<device-serial>{}</device-serial>", escape(serial))
            }
            ShadowTarget::Vsys(vsys) => format!("<vsys>{}</vsys>", escape(vsys)),
        }
    }
}

/// A named policy container and the devices it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGroup {
    pub name: String,
    pub targets: Vec<ShadowTarget>,
}

/// A tag object to create on the management server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagObject {
    pub name: String,
    pub comment: String,
}

/// Result of an idempotent tag creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Created,
    AlreadyExists,
    Failed(ManagementError),
}

impl TagOutcome {
    pub fn is_usable(&self) -> bool {
        !matches!(self, TagOutcome::Failed(_))
    }
}

/// Fetch-all / apply-one access to a device group's security rules.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Fetches the combined pre- and post-rulebase (or the local rulebase).
    async fn fetch_rules(&self, device_group: &str) -> ManagementResult<Vec<Rule>>;

    /// Pushes a rule's tags and comment back to the server.
    async fn apply_rule(&self, device_group: &str, rule: &Rule) -> ManagementResult<()>;
}

/// A live session with one firewall or Panorama node.
#[async_trait]
pub trait PolicyManager: RuleRepository {
    /// Address of the node this session talks to.
    fn hostname(&self) -> &str;

    fn kind(&self) -> ClusterKind;

    /// Reports this node's own HA state.
    async fn ha_state(&self) -> ManagementResult<HaState>;

    /// Lists device groups with their shadow-warning targets.
    async fn device_groups(&self) -> ManagementResult<Vec<DeviceGroup>>;

    /// Runs a raw operational command and returns the parsed `result` mapping.
    async fn run_op(&self, cmd: &str) -> ManagementResult<Value>;

    /// Creates a tag object unless one with the same name already exists.
    async fn ensure_tag(&self, device_group: &str, tag: &TagObject) -> TagOutcome;
}
