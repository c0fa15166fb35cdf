//! Tag and risk annotation of shadowed rules.
//!
//! For every [`ShadowGroup`] the annotator makes sure the group's tag object
//! exists, then brings each member rule to its target state: the group tag
//! present, at most one `risk-*` tag matching the rule's current laxity, and a
//! group marker in the rule comment. Rules already in that state are left
//! alone, so running the annotator twice writes nothing the second time.

use crate::error::ManagementError;
use crate::manager::{PolicyManager, TagObject, TagOutcome};
use crate::orchestrator::Shutdown;
use crate::risk::{score_rule, RiskScore};
use crate::rule::{Rule, RISK_TAG_PREFIX};
use crate::shadow::{truncate_chars, ShadowGroup, DISCRIMINATOR_LEN, GROUP_TAG_PREFIX};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Maximum length of a rule comment accepted by the management API.
pub const COMMENT_MAX_LEN: usize = 1023;

/// What to do with a rule's `risk-*` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTarget {
    /// Scoring disabled; existing risk tags stay as they are.
    Untouched,
    /// Replace any risk tag with this one.
    Set(RiskScore),
    /// The rule is unscored; drop stale risk tags.
    Clear,
}

/// A failed rule write, with enough context to retry by hand.
#[derive(Debug, Clone)]
pub struct AnnotationFailure {
    pub group_index: usize,
    pub member_index: usize,
    pub rule: String,
    pub error: ManagementError,
}

/// Summary of one annotation pass.
#[derive(Debug, Clone, Default)]
pub struct AnnotationReport {
    pub tags_created: usize,
    pub written: usize,
    pub already_correct: usize,
    pub unresolved: Vec<String>,
    pub failed: Vec<AnnotationFailure>,
    /// Groups skipped because their tag object could not be ensured.
    pub skipped_groups: usize,
}

/// Comment marker identifying a group on a member rule.
pub fn group_marker(group: &ShadowGroup) -> String {
    format!("[{}]", group.tag_name())
}

/// Computes the state a rule should be in. Returns `None` when the rule
/// already matches it.
pub fn plan_update(rule: &Rule, group_tag: &str, marker: &str, risk: RiskTarget) -> Option<Rule> {
    let mut tags: Vec<String> = rule.tags.clone().unwrap_or_default();
    if risk != RiskTarget::Untouched {
        tags.retain(|t| !t.starts_with(RISK_TAG_PREFIX));
    }
    if !tags.iter().any(|t| t == group_tag) {
        tags.push(group_tag.to_string());
    }
    if let RiskTarget::Set(score) = risk {
        tags.push(score.tag_name());
    }

    let comment = target_comment(rule.comment.as_deref(), marker);
    let comment_changed = rule.comment.as_deref().unwrap_or_default() != comment;

    if rule.tags_match(&tags) && !comment_changed {
        return None;
    }

    let mut updated = rule.clone();
    updated.tags = Some(tags);
    updated.comment = Some(comment);
    Some(updated)
}

/// Appends `marker` to the comment. Markers of other groups are moved to a
/// suffix after the free text, and only the free text is cut to fit, so a
/// rule in several groups keeps every marker.
fn target_comment(current: Option<&str>, marker: &str) -> String {
    let current = current.unwrap_or_default();
    if current.contains(marker) {
        return current.to_string();
    }

    let (free, mut markers) = split_markers(current);
    markers.push(marker.to_string());
    let suffix = markers.join(" ");

    let room = COMMENT_MAX_LEN.saturating_sub(suffix.chars().count() + 1);
    let free = truncate_chars(free.trim(), room);
    let free = free.trim_end();
    if free.is_empty() {
        truncate_chars(&suffix, COMMENT_MAX_LEN)
    } else {
        format!("{} {}", free, suffix)
    }
}

fn marker_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(&format!(
                r"\[{}[0-9a-f]{{{}}}\]",
                regex::escape(GROUP_TAG_PREFIX),
                DISCRIMINATOR_LEN
            ))
        })
        .as_ref()
        .ok()
}

/// Splits a comment into its free text and the group markers it carries.
fn split_markers(comment: &str) -> (String, Vec<String>) {
    match marker_pattern() {
        Some(re) => (
            re.replace_all(comment, "").into_owned(),
            re.find_iter(comment).map(|m| m.as_str().to_string()).collect(),
        ),
        None => (comment.to_string(), Vec::new()),
    }
}

/// Reconciles group and risk annotations on live rules.
pub struct Annotator<'a> {
    manager: &'a dyn PolicyManager,
    device_group: &'a str,
    shutdown: Option<Shutdown>,
    tag_cache: HashMap<String, bool>,
}

impl<'a> Annotator<'a> {
    pub fn new(manager: &'a dyn PolicyManager, device_group: &'a str) -> Self {
        Self {
            manager,
            device_group,
            shutdown: None,
            tag_cache: HashMap::new(),
        }
    }

    /// Stops between rules once shutdown has been requested.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Applies annotations for every group. `live_rules` is updated in place
    /// after each successful write so later groups see the new state.
    pub async fn apply(
        &mut self,
        groups: &BTreeMap<String, ShadowGroup>,
        live_rules: &mut [Rule],
        risk_enabled: bool,
    ) -> AnnotationReport {
        let mut report = AnnotationReport::default();
        // Names are unique per position only, so a name can hit a pre- and a
        // post-rule.
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, rule) in live_rules.iter().enumerate() {
            by_name.entry(rule.name.clone()).or_default().push(i);
        }

        for (group_index, group) in groups.values().enumerate() {
            if self.interrupted() {
                warn!("Shutdown requested, stopping annotation");
                break;
            }

            let tag_name = group.tag_name();
            let tag = TagObject {
                name: tag_name.clone(),
                comment: group.tag_comment(),
            };
            if !self.ensure_tag(&tag, &mut report).await {
                report.skipped_groups += 1;
                continue;
            }

            let marker = group_marker(group);
            info!(
                "Group {} '{}': {} rules",
                group_index + 1,
                tag_name,
                group.members.len()
            );

            for (member_index, name) in group.members.iter().enumerate() {
                if self.interrupted() {
                    break;
                }
                let Some(slots) = by_name.get(name) else {
                    warn!(
                        group = group_index,
                        member = member_index,
                        "Rule '{}' not found in device group '{}'",
                        name,
                        self.device_group
                    );
                    report.unresolved.push(name.clone());
                    continue;
                };
                if slots.len() > 1 {
                    debug!("Rule name '{}' exists in {} rulebases", name, slots.len());
                }

                for &slot in slots {
                    let risk = if risk_enabled {
                        self.risk_target(&live_rules[slot], &mut report).await
                    } else {
                        RiskTarget::Untouched
                    };

                    let Some(updated) = plan_update(&live_rules[slot], &tag_name, &marker, risk)
                    else {
                        debug!("Rule '{}' already correct", name);
                        report.already_correct += 1;
                        continue;
                    };

                    match self.manager.apply_rule(self.device_group, &updated).await {
                        Ok(()) => {
                            info!(
                                "Rule '{}' ({}) annotated with {}",
                                name, updated.position, tag_name
                            );
                            live_rules[slot] = updated;
                            report.written += 1;
                        }
                        Err(e) => {
                            error!(
                                group = group_index,
                                member = member_index,
                                rule = %name,
                                "Failed to update rule: {}",
                                e
                            );
                            report.failed.push(AnnotationFailure {
                                group_index,
                                member_index,
                                rule: name.clone(),
                                error: e,
                            });
                        }
                    }
                }
            }
        }

        report
    }

    async fn risk_target(&mut self, rule: &Rule, report: &mut AnnotationReport) -> RiskTarget {
        match score_rule(rule) {
            None => RiskTarget::Clear,
            Some(score) => {
                let tag = TagObject {
                    name: score.tag_name(),
                    comment: format!("Rule laxity risk score {}", score),
                };
                if self.ensure_tag(&tag, report).await {
                    RiskTarget::Set(score)
                } else {
                    RiskTarget::Untouched
                }
            }
        }
    }

    async fn ensure_tag(&mut self, tag: &TagObject, report: &mut AnnotationReport) -> bool {
        if let Some(&usable) = self.tag_cache.get(&tag.name) {
            return usable;
        }
        let outcome = self.manager.ensure_tag(self.device_group, tag).await;
        match &outcome {
            TagOutcome::Created => {
                info!("Created tag '{}'", tag.name);
                report.tags_created += 1;
            }
            TagOutcome::AlreadyExists => debug!("Tag '{}' already exists", tag.name),
            TagOutcome::Failed(e) => error!("Failed to ensure tag '{}': {}", tag.name, e),
        }
        let usable = outcome.is_usable();
        self.tag_cache.insert(tag.name.clone(), usable);
        usable
    }

    fn interrupted(&self) -> bool {
        self.shutdown.as_ref().is_some_and(Shutdown::is_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RulePosition;
    use crate::shadow::MemberOrder;

    fn group() -> ShadowGroup {
        ShadowGroup::new(
            vec!["R1".to_string(), "R2".to_string()],
            MemberOrder::Discovery,
        )
    }

    #[test]
    fn test_plan_adds_group_and_risk_tags() {
        let g = group();
        let rule = Rule::new("R2", RulePosition::Pre);
        let updated = plan_update(
            &rule,
            &g.tag_name(),
            &group_marker(&g),
            RiskTarget::Set(RiskScore::TEN),
        )
        .unwrap();
        let tags = updated.tags.unwrap();
        assert!(tags.contains(&g.tag_name()));
        assert!(tags.contains(&"risk-10".to_string()));
        assert_eq!(updated.comment.unwrap(), group_marker(&g));
    }

    #[test]
    fn test_plan_replaces_stale_risk_tag() {
        let g = group();
        let mut rule = Rule::new("R2", RulePosition::Pre);
        rule.tags = Some(vec!["risk-5".to_string(), "owner-netops".to_string()]);
        let updated = plan_update(
            &rule,
            &g.tag_name(),
            &group_marker(&g),
            RiskTarget::Set(RiskScore::EIGHT),
        )
        .unwrap();
        assert_eq!(updated.risk_tags(), vec!["risk-8"]);
        assert!(updated.has_tag("owner-netops"));
    }

    #[test]
    fn test_plan_is_none_when_correct() {
        let g = group();
        let mut rule = Rule::new("R2", RulePosition::Post);
        rule.tags = Some(vec!["risk-10".to_string(), g.tag_name()]);
        rule.comment = Some(format!("Legacy web access {}", group_marker(&g)));
        assert!(plan_update(
            &rule,
            &g.tag_name(),
            &group_marker(&g),
            RiskTarget::Set(RiskScore::TEN)
        )
        .is_none());
    }

    #[test]
    fn test_untouched_keeps_risk_tags() {
        let g = group();
        let mut rule = Rule::new("R2", RulePosition::Pre);
        rule.tags = Some(vec!["risk-5".to_string()]);
        let updated = plan_update(&rule, &g.tag_name(), &group_marker(&g), RiskTarget::Untouched)
            .unwrap();
        assert_eq!(updated.risk_tags(), vec!["risk-5"]);
    }

    #[test]
    fn test_clear_drops_risk_tags() {
        let g = group();
        let mut rule = Rule::new("R2", RulePosition::Pre);
        rule.tags = Some(vec!["risk-9".to_string(), g.tag_name()]);
        rule.comment = Some(group_marker(&g));
        let updated =
            plan_update(&rule, &g.tag_name(), &group_marker(&g), RiskTarget::Clear).unwrap();
        assert!(updated.risk_tags().is_empty());
    }

    #[test]
    fn test_comment_capped_with_marker_kept() {
        let g = group();
        let marker = group_marker(&g);
        let long = "x".repeat(2000);
        let comment = target_comment(Some(&long), &marker);
        assert_eq!(comment.chars().count(), COMMENT_MAX_LEN);
        assert!(comment.ends_with(&marker));
        assert_eq!(target_comment(Some(&comment), &marker), comment);
    }

    #[test]
    fn test_comment_near_cap_keeps_markers_of_both_groups() {
        let a = group();
        let b = ShadowGroup::new(
            vec!["R7".to_string(), "R2".to_string()],
            MemberOrder::Discovery,
        );
        let (marker_a, marker_b) = (group_marker(&a), group_marker(&b));

        let long = "x".repeat(1010);
        let with_a = target_comment(Some(&long), &marker_a);
        let with_both = target_comment(Some(&with_a), &marker_b);

        assert!(with_both.chars().count() <= COMMENT_MAX_LEN);
        assert!(with_both.ends_with(&format!("{} {}", marker_a, marker_b)));
        assert_eq!(target_comment(Some(&with_both), &marker_a), with_both);
        assert_eq!(target_comment(Some(&with_both), &marker_b), with_both);
    }

    #[test]
    fn test_markers_inside_free_text_move_to_suffix() {
        let a = group();
        let b = ShadowGroup::new(vec!["R7".to_string()], MemberOrder::Discovery);
        let current = format!("legacy {} owner netops", group_marker(&a));
        let comment = target_comment(Some(&current), &group_marker(&b));
        assert_eq!(
            comment,
            format!(
                "legacy  owner netops {} {}",
                group_marker(&a),
                group_marker(&b)
            )
        );
    }
}
