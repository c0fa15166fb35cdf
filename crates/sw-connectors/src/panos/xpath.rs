//! Configuration xpaths for Panorama device groups and firewall vsys.

use sw_core::{ClusterKind, RulePosition};

/// Root of the running configuration on both Panorama and firewalls.
pub const DEVICE_ROOT: &str = "/config/devices/entry[@name='localhost.localdomain']";

/// The device group (Panorama) or vsys (firewall) configuration node.
pub fn container(kind: ClusterKind, scope: &str) -> String {
    match kind {
        ClusterKind::Panorama => format!("{}/device-group/entry[@name='{}']", DEVICE_ROOT, scope),
        ClusterKind::Firewall => format!("{}/vsys/entry[@name='{}']", DEVICE_ROOT, scope),
    }
}

/// Rulebase positions that make up the policy of a device group or vsys.
pub fn positions(kind: ClusterKind) -> &'static [RulePosition] {
    match kind {
        ClusterKind::Panorama => &[RulePosition::Pre, RulePosition::Post],
        ClusterKind::Firewall => &[RulePosition::Local],
    }
}

pub fn security_rules(kind: ClusterKind, scope: &str, position: RulePosition) -> String {
    format!("{}/{}/security/rules", container(kind, scope), position)
}

pub fn rule_entry(kind: ClusterKind, scope: &str, position: RulePosition, rule: &str) -> String {
    format!(
        "{}/entry[@name='{}']",
        security_rules(kind, scope, position),
        rule
    )
}

pub fn tag_entry(kind: ClusterKind, scope: &str, tag: &str) -> String {
    format!("{}/tag/entry[@name='{}']", container(kind, scope), tag)
}

/// All virtual systems of a firewall.
pub fn vsys_list() -> String {
    format!("{}/vsys", DEVICE_ROOT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panorama_rulebases() {
        assert_eq!(
            security_rules(ClusterKind::Panorama, "DG-Branch", RulePosition::Pre),
            "/config/devices/entry[@name='localhost.localdomain']/device-group/entry[@name='DG-Branch']/pre-rulebase/security/rules"
        );
        assert!(security_rules(ClusterKind::Panorama, "DG", RulePosition::Post)
            .ends_with("/post-rulebase/security/rules"));
        assert_eq!(positions(ClusterKind::Panorama).len(), 2);
    }

    #[test]
    fn test_firewall_rule_entry() {
        assert_eq!(
            rule_entry(ClusterKind::Firewall, "vsys1", RulePosition::Local, "allow-dns"),
            "/config/devices/entry[@name='localhost.localdomain']/vsys/entry[@name='vsys1']/rulebase/security/rules/entry[@name='allow-dns']"
        );
        assert_eq!(positions(ClusterKind::Firewall), &[RulePosition::Local]);
    }

    #[test]
    fn test_tag_entry() {
        assert_eq!(
            tag_entry(ClusterKind::Panorama, "DG", "shadow-grp-0a1b2c3d"),
            "/config/devices/entry[@name='localhost.localdomain']/device-group/entry[@name='DG']/tag/entry[@name='shadow-grp-0a1b2c3d']"
        );
    }
}
