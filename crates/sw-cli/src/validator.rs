//! Configuration validation for Shadow Warden.
//!
//! Checks the configuration before any cluster is contacted so that
//! mistakes surface as a readable list instead of a failed cycle.

use crate::config::{AppConfig, ClusterEntry};
use colored::Colorize;
use std::collections::BTreeMap;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Errors that prevent a run.
    pub errors: Vec<String>,
    /// Warnings that should be addressed but don't prevent a run.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Configuration Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Configuration Errors:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Configuration OK", "✓".green());
        }
    }
}

/// Validates application configuration before a run.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_general(config, &mut result);
        Self::validate_clusters("Panorama", &config.panoramas, &mut result);
        Self::validate_clusters("Firewall", &config.firewalls, &mut result);

        for address in config.panoramas.keys() {
            if config.firewalls.contains_key(address) {
                result.add_error(format!(
                    "{} is configured both as a Panorama and as a firewall",
                    address
                ));
            }
        }
        for (address, entry) in &config.panoramas {
            if entry.vsys.is_some() {
                result.add_warning(format!(
                    "Panorama {}: 'vsys' is ignored, use 'device_groups'",
                    address
                ));
            }
        }
        for (address, entry) in &config.firewalls {
            if entry.vsys.is_some() && entry.device_groups.is_some() {
                result.add_warning(format!(
                    "Firewall {}: both 'vsys' and 'device_groups' are set, 'vsys' wins",
                    address
                ));
            }
        }

        result
    }

    fn validate_general(config: &AppConfig, result: &mut ValidationResult) {
        if config.panoramas.is_empty() && config.firewalls.is_empty() {
            result.add_error("No panoramas or firewalls are configured");
        }

        if config.check_interval == 0 {
            result.add_error("check_interval must be at least 1 second");
        }

        if config.log_path.is_file() {
            result.add_error(format!(
                "log_path {} is a file, expected a directory",
                config.log_path.display()
            ));
        }

        if !config.verify_tls {
            result.add_warning(
                "TLS certificate verification is disabled. \
                 Management traffic can be intercepted.",
            );
        }
    }

    fn validate_clusters(
        label: &str,
        clusters: &BTreeMap<String, ClusterEntry>,
        result: &mut ValidationResult,
    ) {
        for (address, entry) in clusters {
            if address.trim().is_empty() {
                result.add_error(format!("{} with an empty address", label));
                continue;
            }

            if entry.api_key.as_ref().map_or(true, |k| k.is_empty()) {
                result.add_warning(format!(
                    "{} {}: no api_key, credentials will be requested on the next run",
                    label, address
                ));
            }

            if let Some(peer) = &entry.ha_peer_ip {
                if peer == address {
                    result.add_error(format!(
                        "{} {}: ha_peer_ip is the same as the primary address",
                        label, address
                    ));
                }
            }

            if entry.timeout == Some(0) {
                result.add_error(format!(
                    "{} {}: timeout must be at least 1 second",
                    label, address
                ));
            }

            if entry
                .device_groups
                .as_ref()
                .is_some_and(|groups| groups.is_empty())
            {
                result.add_warning(format!(
                    "{} {}: device_groups is empty, nothing will be processed",
                    label, address
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_core::SecureString;

    fn entry(key: &str) -> ClusterEntry {
        ClusterEntry {
            api_key: Some(SecureString::from(key)),
            ..Default::default()
        }
    }

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.panoramas.insert("10.0.0.10".to_string(), entry("KEY"));
        config
    }

    #[test]
    fn test_validation_result() {
        let mut result = ValidationResult::new();
        assert!(!result.has_errors());
        assert!(!result.has_warnings());

        result.add_error("Test error");
        assert!(result.has_errors());

        result.add_warning("Test warning");
        assert!(result.has_warnings());
    }

    #[test]
    fn test_valid_config() {
        let result = ConfigValidator::validate(&valid_config());
        assert!(!result.has_errors(), "{:?}", result.errors);
        assert!(!result.has_warnings(), "{:?}", result.warnings);
    }

    #[test]
    fn test_no_clusters() {
        let result = ConfigValidator::validate(&AppConfig::default());
        assert!(result.errors.iter().any(|e| e.contains("No panoramas")));
    }

    #[test]
    fn test_zero_interval() {
        let mut config = valid_config();
        config.check_interval = 0;
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("check_interval")));
    }

    #[test]
    fn test_missing_key_is_a_warning() {
        let mut config = valid_config();
        config
            .firewalls
            .insert("10.0.1.1".to_string(), ClusterEntry::default());
        let result = ConfigValidator::validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("10.0.1.1")));
    }

    #[test]
    fn test_peer_same_as_primary() {
        let mut config = valid_config();
        config.panoramas.insert(
            "10.0.0.20".to_string(),
            ClusterEntry {
                ha_peer_ip: Some("10.0.0.20".to_string()),
                ..entry("KEY")
            },
        );
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("ha_peer_ip")));
    }

    #[test]
    fn test_duplicate_address() {
        let mut config = valid_config();
        config.firewalls.insert("10.0.0.10".to_string(), entry("KEY"));
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("both")));
    }

    #[test]
    fn test_tls_disabled_warns() {
        let mut config = valid_config();
        config.verify_tls = false;
        let result = ConfigValidator::validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("TLS")));
    }

    #[test]
    fn test_log_path_is_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = valid_config();
        config.log_path = file.path().to_path_buf();
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("log_path")));
    }
}
