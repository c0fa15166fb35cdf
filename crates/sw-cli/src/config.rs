//! Configuration loading for the Shadow Warden CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use sw_core::{
    ClusterKind, CycleOptions, Endpoint, KeyStore, ManagedCluster, MemberOrder, SecureString,
};

const REDACTED: &str = "***REDACTED***";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for the rotated log file.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Keep polling until interrupted instead of running a single cycle.
    #[serde(default)]
    pub daemon_mode: bool,

    /// Seconds between cycles in daemon mode.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Tag shadowed rules with a `risk-<score>` tag.
    #[serde(default = "default_true")]
    pub risk_scoring: bool,

    /// Sort group members before hashing them into the group tag.
    #[serde(default)]
    pub normalize_member_order: bool,

    /// Verify the management servers' TLS certificates.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Panorama clusters keyed by primary address.
    #[serde(default)]
    pub panoramas: BTreeMap<String, ClusterEntry>,

    /// Firewall clusters keyed by primary address.
    #[serde(default)]
    pub firewalls: BTreeMap<String, ClusterEntry>,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("logs")
}

fn default_check_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            daemon_mode: false,
            check_interval: default_check_interval(),
            risk_scoring: true,
            normalize_member_order: false,
            verify_tls: true,
            panoramas: BTreeMap::new(),
            firewalls: BTreeMap::new(),
        }
    }
}

/// One configured cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntry {
    /// API key. Generated interactively and saved back when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecureString>,

    /// Address of the HA peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ha_peer_ip: Option<String>,

    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Device groups to process (Panorama). All when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_groups: Option<Vec<String>>,

    /// Virtual system to process (firewall). All when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vsys: Option<String>,
}

impl ClusterEntry {
    fn to_cluster(&self, kind: ClusterKind, address: &str) -> ManagedCluster {
        let device_groups = match kind {
            ClusterKind::Firewall => self
                .vsys
                .as_ref()
                .map(|vsys| vec![vsys.clone()])
                .or_else(|| self.device_groups.clone()),
            ClusterKind::Panorama => self.device_groups.clone(),
        };
        ManagedCluster {
            name: address.to_string(),
            kind,
            primary: Endpoint {
                address: address.to_string(),
                api_key: self.api_key.clone(),
                timeout_secs: self.timeout,
            },
            ha_peer: self.ha_peer_ip.clone(),
            device_groups,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Saves configuration to a file. The file is replaced atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_yaml::to_string(self)?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        file.write_all(contents.as_bytes())?;
        file.persist(path)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Creates a copy with secrets redacted.
    pub fn redact_secrets(&self) -> Self {
        let mut config = self.clone();

        for entry in config
            .panoramas
            .values_mut()
            .chain(config.firewalls.values_mut())
        {
            if entry.api_key.as_ref().is_some_and(|k| !k.is_empty()) {
                entry.api_key = Some(SecureString::from(REDACTED));
            }
        }

        config
    }

    /// Every configured cluster, Panoramas first.
    pub fn to_clusters(&self) -> Vec<ManagedCluster> {
        self.panoramas
            .iter()
            .map(|(address, entry)| entry.to_cluster(ClusterKind::Panorama, address))
            .chain(
                self.firewalls
                    .iter()
                    .map(|(address, entry)| entry.to_cluster(ClusterKind::Firewall, address)),
            )
            .collect()
    }

    pub fn cycle_options(&self) -> CycleOptions {
        CycleOptions {
            risk_enabled: self.risk_scoring,
            member_order: if self.normalize_member_order {
                MemberOrder::Sorted
            } else {
                MemberOrder::Discovery
            },
        }
    }

    fn entries_mut(&mut self, kind: ClusterKind) -> &mut BTreeMap<String, ClusterEntry> {
        match kind {
            ClusterKind::Panorama => &mut self.panoramas,
            ClusterKind::Firewall => &mut self.firewalls,
        }
    }
}

/// Writes minted API keys back into the configuration file.
pub struct ConfigKeyStore<'a> {
    config: &'a mut AppConfig,
    path: &'a Path,
}

impl<'a> ConfigKeyStore<'a> {
    pub fn new(config: &'a mut AppConfig, path: &'a Path) -> Self {
        Self { config, path }
    }
}

impl KeyStore for ConfigKeyStore<'_> {
    fn store_api_key(
        &mut self,
        kind: ClusterKind,
        cluster: &str,
        key: &SecureString,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let entry = self
            .config
            .entries_mut(kind)
            .get_mut(cluster)
            .ok_or_else(|| format!("cluster {} is not in the configuration", cluster))?;
        entry.api_key = Some(key.clone());
        self.config.save(self.path)?;
        Ok(())
    }
}
