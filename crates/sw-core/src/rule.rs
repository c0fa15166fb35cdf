//! Security rule model.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Prefix shared by every risk tag (`risk-10`, `risk-9.5`, ...).
pub const RISK_TAG_PREFIX: &str = "risk-";

/// Where a rule lives in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePosition {
    /// Panorama pre-rulebase, evaluated before device-local rules.
    Pre,
    /// Panorama post-rulebase, evaluated after device-local rules.
    Post,
    /// A firewall's own rulebase.
    Local,
}

impl fmt::Display for RulePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePosition::Pre => write!(f, "pre-rulebase"),
            RulePosition::Post => write!(f, "post-rulebase"),
            RulePosition::Local => write!(f, "rulebase"),
        }
    }
}

/// A security rule as fetched from the management server.
///
/// Only the fields the annotator reads or writes are modelled. Writes push
/// back `tags` and `comment` and leave everything else on the server alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule name, unique within its position.
    pub name: String,
    pub position: RulePosition,
    pub source: Vec<String>,
    pub destination: Vec<String>,
    pub service: Vec<String>,
    pub application: Vec<String>,
    /// Free-text comment (the PAN-OS `description`).
    pub comment: Option<String>,
    /// `None` when the rule carries no tag element at all.
    pub tags: Option<Vec<String>>,
}

impl Rule {
    /// Creates a rule with every match field set to `any` and no tags.
    pub fn new(name: impl Into<String>, position: RulePosition) -> Self {
        Self {
            name: name.into(),
            position,
            source: vec!["any".to_string()],
            destination: vec!["any".to_string()],
            service: vec!["any".to_string()],
            application: vec!["any".to_string()],
            comment: None,
            tags: None,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .as_ref()
            .is_some_and(|tags| tags.iter().any(|t| t == tag))
    }

    /// Returns every `risk-*` tag currently on the rule.
    pub fn risk_tags(&self) -> Vec<&str> {
        self.tags
            .iter()
            .flatten()
            .filter(|t| t.starts_with(RISK_TAG_PREFIX))
            .map(String::as_str)
            .collect()
    }

    /// Compares tag state as sets. A missing tag list equals an empty target.
    pub fn tags_match(&self, target: &[String]) -> bool {
        let current: HashSet<&str> = self.tags.iter().flatten().map(String::as_str).collect();
        let wanted: HashSet<&str> = target.iter().map(String::as_str).collect();
        current == wanted
    }
}

/// True when a match field is exactly `["any"]`.
pub fn is_only_any(values: &[String]) -> bool {
    matches!(values, [only] if only == "any")
}
