//! In-memory policy manager for testing.

use crate::error::{ManagementError, ManagementResult};
use crate::manager::{
    ClusterKind, DeviceGroup, HaState, PolicyManager, RuleRepository, ShadowTarget, TagObject,
    TagOutcome,
};
use crate::rule::{Rule, RulePosition};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct MockState {
    device_groups: Vec<DeviceGroup>,
    rules: HashMap<String, Vec<Rule>>,
    tags: HashMap<String, HashMap<String, TagObject>>,
    /// Parsed `result` mappings keyed by exact command text.
    op_responses: HashMap<String, Value>,
    failing_ops: HashSet<String>,
    failing_rules: HashSet<String>,
    applied: Vec<(String, Rule)>,
    ops_issued: Vec<String>,
}

/// Mock firewall or Panorama session.
///
/// Shadow-warning responses are registered per target with
/// [`MockPolicyManager::with_shadow`]; rule writes are recorded and applied to
/// the stored rulebase.
#[derive(Clone)]
pub struct MockPolicyManager {
    hostname: String,
    kind: ClusterKind,
    ha_state: Arc<RwLock<ManagementResult<HaState>>>,
    state: Arc<RwLock<MockState>>,
}

impl MockPolicyManager {
    pub fn new(hostname: &str, kind: ClusterKind) -> Self {
        Self {
            hostname: hostname.to_string(),
            kind,
            ha_state: Arc::new(RwLock::new(Ok(HaState::Disabled))),
            state: Arc::new(RwLock::new(MockState::default())),
        }
    }

    pub async fn set_ha_state(&self, state: ManagementResult<HaState>) {
        *self.ha_state.write().await = state;
    }

    pub async fn add_device_group(&self, name: &str, targets: Vec<ShadowTarget>, rules: Vec<Rule>) {
        let mut state = self.state.write().await;
        state.device_groups.push(DeviceGroup {
            name: name.to_string(),
            targets,
        });
        state.rules.insert(name.to_string(), rules);
    }

    /// Registers a head rule on a target that shadows `shadowed`.
    pub async fn with_shadow(&self, target: &ShadowTarget, head: &str, uuid: &str, shadowed: &[&str]) {
        let mut state = self.state.write().await;
        let count_cmd = crate::shadow::count_command(target);
        let entry = json!({"@name": head, "@uuid": uuid, "#text": shadowed.len().to_string()});

        let counts = state
            .op_responses
            .entry(count_cmd)
            .or_insert_with(|| json!({"shadow-warnings-count": {"entry": []}}));
        if let Some(Value::Array(entries)) = counts.pointer_mut("/shadow-warnings-count/entry") {
            entries.push(entry);
        }

        let members: Vec<Value> = shadowed
            .iter()
            .map(|name| Value::String(format!("Shadows {}.", name)))
            .collect();
        let member = if members.len() == 1 {
            members[0].clone()
        } else {
            Value::Array(members)
        };
        state.op_responses.insert(
            crate::shadow::detail_command(target, uuid),
            json!({"warning-msg": {"member": member}}),
        );
    }

    /// Makes the operational command fail.
    pub async fn fail_op(&self, cmd: &str) {
        self.state.write().await.failing_ops.insert(cmd.to_string());
    }

    /// Makes writes to the named rule fail.
    pub async fn fail_rule_writes(&self, rule: &str) {
        self.state.write().await.failing_rules.insert(rule.to_string());
    }

    /// Rule writes recorded so far, as (device group, rule).
    pub async fn applied(&self) -> Vec<(String, Rule)> {
        self.state.read().await.applied.clone()
    }

    pub async fn ops_issued(&self) -> Vec<String> {
        self.state.read().await.ops_issued.clone()
    }

    pub async fn tag(&self, device_group: &str, name: &str) -> Option<TagObject> {
        self.state
            .read()
            .await
            .tags
            .get(device_group)
            .and_then(|tags| tags.get(name))
            .cloned()
    }

    /// The rule with this name in a specific rulebase position.
    pub async fn rule_at(
        &self,
        device_group: &str,
        name: &str,
        position: RulePosition,
    ) -> Option<Rule> {
        self.state
            .read()
            .await
            .rules
            .get(device_group)
            .and_then(|rules| {
                rules
                    .iter()
                    .find(|r| r.name == name && r.position == position)
            })
            .cloned()
    }

    pub async fn rule(&self, device_group: &str, name: &str) -> Option<Rule> {
        self.state
            .read()
            .await
            .rules
            .get(device_group)
            .and_then(|rules| rules.iter().find(|r| r.name == name))
            .cloned()
    }
}

#[async_trait]
impl RuleRepository for MockPolicyManager {
    async fn fetch_rules(&self, device_group: &str) -> ManagementResult<Vec<Rule>> {
        self.state
            .read()
            .await
            .rules
            .get(device_group)
            .cloned()
            .ok_or_else(|| ManagementError::NotFound(format!("device group {}", device_group)))
    }

    async fn apply_rule(&self, device_group: &str, rule: &Rule) -> ManagementResult<()> {
        let mut state = self.state.write().await;
        if state.failing_rules.contains(&rule.name) {
            return Err(ManagementError::Api(format!("edit of {} rejected", rule.name)));
        }
        let stored = state
            .rules
            .get_mut(device_group)
            .and_then(|rules| {
                rules
                    .iter_mut()
                    .find(|r| r.name == rule.name && r.position == rule.position)
            })
            .ok_or_else(|| ManagementError::NotFound(rule.name.clone()))?;
        *stored = rule.clone();
        state.applied.push((device_group.to_string(), rule.clone()));
        Ok(())
    }
}

#[async_trait]
impl PolicyManager for MockPolicyManager {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn kind(&self) -> ClusterKind {
        self.kind
    }

    async fn ha_state(&self) -> ManagementResult<HaState> {
        self.ha_state.read().await.clone()
    }

    async fn device_groups(&self) -> ManagementResult<Vec<DeviceGroup>> {
        Ok(self.state.read().await.device_groups.clone())
    }

    async fn run_op(&self, cmd: &str) -> ManagementResult<Value> {
        let mut state = self.state.write().await;
        state.ops_issued.push(cmd.to_string());
        if state.failing_ops.contains(cmd) {
            return Err(ManagementError::Timeout(cmd.to_string()));
        }
        Ok(state.op_responses.get(cmd).cloned().unwrap_or(Value::Null))
    }

    async fn ensure_tag(&self, device_group: &str, tag: &TagObject) -> TagOutcome {
        let mut state = self.state.write().await;
        let tags = state.tags.entry(device_group.to_string()).or_default();
        if tags.contains_key(&tag.name) {
            return TagOutcome::AlreadyExists;
        }
        tags.insert(tag.name.clone(), tag.clone());
        TagOutcome::Created
    }
}
