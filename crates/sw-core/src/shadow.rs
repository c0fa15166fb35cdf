//! Shadow-rule discovery and grouping.
//!
//! A rule shadows another when every packet the later rule would match is
//! already matched by the earlier one. PAN-OS reports this per device as a
//! count of warnings per shadowing ("head") rule, and on request as the list
//! of rules each head shadows. This module turns those two queries into
//! [`ShadowGroup`]s with a content-derived tag name.

use crate::error::{ManagementError, ManagementResult};
use crate::manager::{DeviceGroup, PolicyManager, ShadowTarget};
use quick_xml::escape::escape;
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, error, info, instrument, warn};

/// Prefix of every group tag name.
pub const GROUP_TAG_PREFIX: &str = "shadow-grp-";

/// Number of trailing hex digest characters used as the group discriminator.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Maximum length of a tag comment accepted by the management API.
pub const TAG_COMMENT_MAX_LEN: usize = 1000;

/// Characters wrapped around the rule name in a warning-message member.
const MEMBER_PREFIX_LEN: usize = 8;
const MEMBER_SUFFIX_LEN: usize = 1;

/// How the member list is ordered before hashing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MemberOrder {
    /// Head first, then shadowed rules in the order the API returned them.
    /// Identical membership discovered in a different order hashes differently.
    #[default]
    Discovery,
    /// Members are sorted before hashing so the discriminator depends only on
    /// membership.
    Sorted,
}

/// One shadow-warning count entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowRelation {
    /// Name of the shadowing rule.
    pub rule: String,
    /// Identifier used to fetch the warning detail.
    pub uuid: String,
    /// Number of rules this rule shadows.
    pub count: usize,
}

/// A set of rules implicated by one shadowing head rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowGroup {
    /// Head first, then the shadowed rules.
    pub members: Vec<String>,
    /// Full hex SHA-1 digest of the hashed member list.
    pub digest: String,
    /// Last [`DISCRIMINATOR_LEN`] characters of `digest`.
    pub discriminator: String,
}

impl ShadowGroup {
    /// Builds a group from an ordered member list.
    pub fn new(members: Vec<String>, order: MemberOrder) -> Self {
        let digest = match order {
            MemberOrder::Discovery => member_digest(&members),
            MemberOrder::Sorted => {
                let mut sorted = members.clone();
                sorted.sort();
                member_digest(&sorted)
            }
        };
        let discriminator = digest[digest.len() - DISCRIMINATOR_LEN..].to_string();
        Self {
            members,
            digest,
            discriminator,
        }
    }

    /// The head rule whose warnings produced this group.
    pub fn head(&self) -> &str {
        self.members.first().map(String::as_str).unwrap_or_default()
    }

    pub fn tag_name(&self) -> String {
        format!("{}{}", GROUP_TAG_PREFIX, self.discriminator)
    }

    /// Full comment with the complete member list.
    pub fn comment(&self) -> String {
        format!(
            "Shadow group {}. Members {}",
            self.discriminator,
            self.members.join(", ")
        )
    }

    /// Comment truncated to what the management API accepts for a tag.
    pub fn tag_comment(&self) -> String {
        truncate_chars(&self.comment(), TAG_COMMENT_MAX_LEN)
    }
}

/// Outcome of discovering shadow groups in one device group.
#[derive(Debug, Clone, Default)]
pub struct ShadowDiscovery {
    /// Groups keyed by head rule name.
    pub groups: BTreeMap<String, ShadowGroup>,
    /// Heads whose detail query failed. They have no group.
    pub failed_heads: Vec<String>,
}

impl ShadowDiscovery {
    pub fn is_complete(&self) -> bool {
        self.failed_heads.is_empty()
    }

    pub fn shadow_count(&self) -> usize {
        shadow_count(&self.groups)
    }
}

/// Number of distinct rules implicated in any group.
pub fn shadow_count(groups: &BTreeMap<String, ShadowGroup>) -> usize {
    groups
        .values()
        .flat_map(|g| g.members.iter())
        .collect::<HashSet<_>>()
        .len()
}

/// SHA-1 hex digest of `[a, b, c]`.
pub fn member_digest(members: &[String]) -> String {
    let rendered = format!("[{}]", members.join(", "));
    hex::encode(Sha1::digest(rendered.as_bytes()))
}

/// Operational command returning shadow-warning counts for one target.
pub fn count_command(target: &ShadowTarget) -> String {
    format!(
        "<show><shadow-warning><count>{}</count></shadow-warning></show>",
        target.selector_xml()
    )
}

/// Operational command returning the rules shadowed by one head rule.
pub fn detail_command(target: &ShadowTarget, uuid: &str) -> String {
    format!(
        "<show><shadow-warning><warning-message>{}<uuid>{}</uuid></warning-message></shadow-warning></show>",
        target.selector_xml(),
        escape(uuid)
    )
}

/// Parses a count response. A missing count element means no warnings.
pub fn parse_counts(result: &Value) -> ManagementResult<Vec<ShadowRelation>> {
    let entries = match result
        .get("shadow-warnings-count")
        .and_then(|c| c.get("entry"))
    {
        Some(entries) => entries,
        None => return Ok(Vec::new()),
    };

    let mut relations = Vec::new();
    for entry in as_list(entries) {
        let rule = entry
            .get("@name")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("count entry without @name", entry))?;
        let uuid = entry
            .get("@uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("count entry without @uuid", entry))?;
        let count = text_of(entry)
            .and_then(|t| t.trim().parse::<usize>().ok())
            .unwrap_or(0);
        relations.push(ShadowRelation {
            rule: rule.to_string(),
            uuid: uuid.to_string(),
            count,
        });
    }
    Ok(relations)
}

/// Parses a warning-message response into shadowed rule names.
///
/// The API collapses a one-element list into a bare string. Both shapes
/// produce a list.
pub fn parse_shadowed_members(result: &Value) -> ManagementResult<Vec<String>> {
    let members = result
        .get("warning-msg")
        .and_then(|w| w.get("member"))
        .ok_or_else(|| malformed("missing warning-msg/member", result))?;

    as_list(members)
        .into_iter()
        .map(|member| {
            let text = text_of(member)
                .ok_or_else(|| malformed("warning-msg member is not text", member))?;
            strip_member(text).ok_or_else(|| malformed("warning-msg member too short", member))
        })
        .collect()
}

fn strip_member(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= MEMBER_PREFIX_LEN + MEMBER_SUFFIX_LEN {
        return None;
    }
    Some(
        chars[MEMBER_PREFIX_LEN..chars.len() - MEMBER_SUFFIX_LEN]
            .iter()
            .collect(),
    )
}

/// Discovers shadow groups in one device group.
///
/// Issues one count query per target, then one detail query per head rule.
/// A failed count query fails the whole device group. A failed detail query
/// drops only that head, which is then listed in
/// [`ShadowDiscovery::failed_heads`].
#[instrument(skip(manager, device_group), fields(device_group = %device_group.name))]
pub async fn discover_shadow_groups(
    manager: &dyn PolicyManager,
    device_group: &DeviceGroup,
    order: MemberOrder,
) -> ManagementResult<ShadowDiscovery> {
    let mut pending: Vec<(&ShadowTarget, ShadowRelation)> = Vec::new();
    for target in &device_group.targets {
        let result = manager.run_op(&count_command(target)).await?;
        let relations = parse_counts(&result).map_err(|e| {
            error!(payload = %result, "Unparseable shadow-warning count response");
            e
        })?;
        debug!(?target, warnings = relations.len(), "Shadow-warning counts fetched");
        pending.extend(relations.into_iter().map(|r| (target, r)));
    }

    if pending.is_empty() {
        info!("No shadow warnings in device group '{}'", device_group.name);
        return Ok(ShadowDiscovery::default());
    }

    let total = pending.len();
    let mut merged: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut failed: Vec<String> = Vec::new();

    for (i, (target, relation)) in pending.into_iter().enumerate() {
        info!(
            "[{}/{}] Fetching rules shadowed by '{}' ({} warnings)",
            i + 1,
            total,
            relation.rule,
            relation.count
        );
        if failed.contains(&relation.rule) {
            continue;
        }

        let shadowed = match manager
            .run_op(&detail_command(target, &relation.uuid))
            .await
        {
            Ok(result) => match parse_shadowed_members(&result) {
                Ok(members) => members,
                Err(e) => {
                    error!(rule = %relation.rule, payload = %result, "Failed to parse shadow detail: {}", e);
                    failed.push(relation.rule);
                    continue;
                }
            },
            Err(e) => {
                error!(rule = %relation.rule, "Shadow detail query failed: {}", e);
                failed.push(relation.rule);
                continue;
            }
        };

        let slot = *index.entry(relation.rule.clone()).or_insert_with(|| {
            merged.push((relation.rule.clone(), vec![relation.rule.clone()]));
            merged.len() - 1
        });
        let members = &mut merged[slot].1;
        for name in shadowed {
            if !members.contains(&name) {
                members.push(name);
            }
        }
    }

    let mut discovery = ShadowDiscovery {
        failed_heads: failed.clone(),
        ..Default::default()
    };
    for (head, members) in merged {
        if failed.contains(&head) {
            continue;
        }
        if members.len() < 2 {
            warn!(rule = %head, "Shadow warning without shadowed rules, skipping");
            continue;
        }
        discovery.groups.insert(head, ShadowGroup::new(members, order));
    }

    info!(
        groups = discovery.groups.len(),
        rules = discovery.shadow_count(),
        failed = discovery.failed_heads.len(),
        "Shadow discovery finished for '{}'",
        device_group.name
    );
    Ok(discovery)
}

/// Views a mapping node as a list: arrays as-is, null as empty, anything else
/// as a single element.
pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Text content of a mapping node: a bare string or its `#text` key.
pub fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("#text").and_then(Value::as_str),
        _ => None,
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn malformed(what: &str, payload: &Value) -> ManagementError {
    ManagementError::MalformedResponse(format!("{}: {}", what, payload))
}
