//! Security rule decoding and write payloads.

use crate::traits::{ConnectorError, ConnectorResult};
use crate::xml::{escape, member_list};
use serde_json::Value;
use sw_core::shadow::{as_list, text_of};
use sw_core::{Rule, RulePosition};

/// Decodes the `result` of a config `get` on a `.../security/rules` xpath.
///
/// An empty rulebase answers without a `<rules>` element or with an empty
/// one; both decode to no rules.
pub fn parse_rules(result: &Value, position: RulePosition) -> ConnectorResult<Vec<Rule>> {
    let Some(entries) = result.get("rules").and_then(|rules| rules.get("entry")) else {
        return Ok(Vec::new());
    };

    as_list(entries)
        .into_iter()
        .map(|entry| parse_rule(entry, position))
        .collect()
}

fn parse_rule(entry: &Value, position: RulePosition) -> ConnectorResult<Rule> {
    let name = entry
        .get("@name")
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectorError::InvalidResponse(format!("rule entry without name: {}", entry)))?;

    Ok(Rule {
        name: name.to_string(),
        position,
        source: field_members(entry, "source"),
        destination: field_members(entry, "destination"),
        service: field_members(entry, "service"),
        application: field_members(entry, "application"),
        comment: entry
            .get("description")
            .and_then(text_of)
            .map(str::to_string),
        tags: entry.get("tag").map(members),
    })
}

fn field_members(entry: &Value, field: &str) -> Vec<String> {
    entry.get(field).map(members).unwrap_or_default()
}

/// `<member>` texts of a list node. An empty node has none.
fn members(node: &Value) -> Vec<String> {
    node.get("member")
        .map(|m| {
            as_list(m)
                .into_iter()
                .filter_map(text_of)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `element` payload replacing a rule's tag list.
pub fn tag_element(tags: &[String]) -> String {
    member_list("tag", tags)
}

/// `element` payload replacing a rule's description.
pub fn description_element(comment: &str) -> String {
    format!("<description>{}</description>", escape(comment))
}
