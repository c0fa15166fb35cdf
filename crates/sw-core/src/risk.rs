//! Rule laxity risk scoring.
//!
//! A rule's risk is derived from four predicates over its match criteria:
//! whether source, destination, service and application are each exactly
//! `any`. The predicates feed a fixed decision table where the first matching
//! row wins. Scores have half-point resolution (9.5 is a valid score).

use crate::rule::{is_only_any, Rule, RISK_TAG_PREFIX};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A risk score with half-point resolution, stored as a count of half points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RiskScore(u8);

impl RiskScore {
    pub const FIVE: RiskScore = RiskScore(10);
    pub const SIX: RiskScore = RiskScore(12);
    pub const SEVEN: RiskScore = RiskScore(14);
    pub const EIGHT: RiskScore = RiskScore(16);
    pub const NINE: RiskScore = RiskScore(18);
    pub const NINE_AND_HALF: RiskScore = RiskScore(19);
    pub const TEN: RiskScore = RiskScore(20);

    pub fn half_points(self) -> u8 {
        self.0
    }

    pub fn as_f32(self) -> f32 {
        f32::from(self.0) / 2.0
    }

    /// Tag name for this score, e.g. `risk-9.5` or `risk-10`.
    pub fn tag_name(self) -> String {
        format!("{}{}", RISK_TAG_PREFIX, self)
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 2 == 0 {
            write!(f, "{}", self.0 / 2)
        } else {
            write!(f, "{}.5", self.0 / 2)
        }
    }
}

/// The four laxity predicates of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaxityPredicates {
    pub source_any: bool,
    pub destination_any: bool,
    /// Only a literal `any` counts. `application-default` is treated as a
    /// specific service even though the laxity table groups it with `any`;
    /// counting it as `any` would score a source-any, destination-specific,
    /// `application-default`, application-any rule 9.5 instead of 6.
    pub service_any: bool,
    pub application_any: bool,
}

impl LaxityPredicates {
    pub fn of(rule: &Rule) -> Self {
        Self {
            source_any: is_only_any(&rule.source),
            destination_any: is_only_any(&rule.destination),
            service_any: is_only_any(&rule.service),
            application_any: is_only_any(&rule.application),
        }
    }

    /// Applies the decision table. `None` means the rule is unscored.
    pub fn score(self) -> Option<RiskScore> {
        let Self {
            source_any: s,
            destination_any: d,
            service_any: svc,
            application_any: app,
        } = self;

        match (s, d, svc, app) {
            (true, true, true, true) => Some(RiskScore::TEN),
            (s, d, true, true) if s != d => Some(RiskScore::NINE_AND_HALF),
            (false, false, true, true) => Some(RiskScore::NINE),
            (true, true, false, true) | (true, true, true, false) => Some(RiskScore::EIGHT),
            (false, true, false, true) | (false, true, true, false) => Some(RiskScore::SEVEN),
            (true, false, false, true) | (true, false, true, false) => Some(RiskScore::SIX),
            (false, false, false, true) | (false, false, true, false) => Some(RiskScore::FIVE),
            _ => None,
        }
    }
}

/// Computes the risk score of a rule from its current match fields.
pub fn score_rule(rule: &Rule) -> Option<RiskScore> {
    LaxityPredicates::of(rule).score()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RulePosition;

    fn rule_with(source: &str, destination: &str, service: &str, application: &str) -> Rule {
        let mut rule = Rule::new("test-rule", RulePosition::Pre);
        rule.source = vec![source.to_string()];
        rule.destination = vec![destination.to_string()];
        rule.service = vec![service.to_string()];
        rule.application = vec![application.to_string()];
        rule
    }

    fn preds(s: bool, d: bool, svc: bool, app: bool) -> LaxityPredicates {
        LaxityPredicates {
            source_any: s,
            destination_any: d,
            service_any: svc,
            application_any: app,
        }
    }

    #[test]
    fn test_fully_open_rule_scores_ten() {
        assert_eq!(score_rule(&rule_with("any", "any", "any", "any")), Some(RiskScore::TEN));
    }

    #[test]
    fn test_application_default_any_source_scores_six() {
        let rule = rule_with("any", "10.1.1.0/24", "application-default", "any");
        assert_eq!(score_rule(&rule), Some(RiskScore::SIX));
    }

    #[test]
    fn test_decision_table_rows() {
        let cases = [
            (preds(true, false, true, true), Some(RiskScore::NINE_AND_HALF)),
            (preds(false, true, true, true), Some(RiskScore::NINE_AND_HALF)),
            (preds(false, false, true, true), Some(RiskScore::NINE)),
            (preds(true, true, false, true), Some(RiskScore::EIGHT)),
            (preds(true, true, true, false), Some(RiskScore::EIGHT)),
            (preds(false, true, false, true), Some(RiskScore::SEVEN)),
            (preds(false, true, true, false), Some(RiskScore::SEVEN)),
            (preds(true, false, false, true), Some(RiskScore::SIX)),
            (preds(true, false, true, false), Some(RiskScore::SIX)),
            (preds(false, false, false, true), Some(RiskScore::FIVE)),
            (preds(false, false, true, false), Some(RiskScore::FIVE)),
            (preds(true, true, false, false), None),
            (preds(false, false, false, false), None),
        ];
        for (p, expected) in cases {
            assert_eq!(p.score(), expected, "predicates {:?}", p);
        }
    }

    #[test]
    fn test_every_combination_is_decided() {
        let allowed = [
            RiskScore::FIVE,
            RiskScore::SIX,
            RiskScore::SEVEN,
            RiskScore::EIGHT,
            RiskScore::NINE,
            RiskScore::NINE_AND_HALF,
            RiskScore::TEN,
        ];
        for bits in 0u8..16 {
            let p = preds(bits & 8 != 0, bits & 4 != 0, bits & 2 != 0, bits & 1 != 0);
            if let Some(score) = p.score() {
                assert!(allowed.contains(&score), "unexpected score {}", score);
            }
        }
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(RiskScore::TEN.tag_name(), "risk-10");
        assert_eq!(RiskScore::NINE_AND_HALF.tag_name(), "risk-9.5");
        assert_eq!(RiskScore::FIVE.tag_name(), "risk-5");
        assert!((RiskScore::NINE_AND_HALF.as_f32() - 9.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_multi_member_fields_are_not_any() {
        let mut rule = rule_with("any", "any", "any", "any");
        rule.source = vec!["any".to_string(), "10.0.0.0/8".to_string()];
        assert_eq!(score_rule(&rule), Some(RiskScore::NINE_AND_HALF));
    }
}
