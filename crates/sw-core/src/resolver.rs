//! Active-endpoint resolution for firewall and Panorama clusters.
//!
//! Each configured cluster is a primary endpoint plus an optional HA peer.
//! Every poll cycle the resolver makes sure an API key exists, opens a
//! session, and when a peer is configured asks the nodes which of them is
//! active. Nothing is cached between cycles except a freshly minted key.

use crate::error::{ManagementResult, ResolveError};
use crate::manager::{ClusterKind, HaState, PolicyManager};
use crate::secret::SecureString;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// One management address and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub api_key: Option<SecureString>,
    pub timeout_secs: Option<u64>,
}

impl Endpoint {
    pub fn has_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }
}

/// A logical cluster: primary endpoint, optional HA peer.
#[derive(Debug, Clone)]
pub struct ManagedCluster {
    /// Config key of the cluster (the primary address in practice).
    pub name: String,
    pub kind: ClusterKind,
    pub primary: Endpoint,
    pub ha_peer: Option<String>,
    /// Device groups to process. `None` processes all of them.
    pub device_groups: Option<Vec<String>>,
}

impl ManagedCluster {
    /// The peer endpoint, sharing the primary's key and timeout.
    pub fn peer_endpoint(&self) -> Option<Endpoint> {
        self.ha_peer.as_ref().map(|address| Endpoint {
            address: address.clone(),
            api_key: self.primary.api_key.clone(),
            timeout_secs: self.primary.timeout_secs,
        })
    }
}

/// Username and password used once to mint an API key.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecureString,
}

/// The endpoint chosen for a cluster in this cycle.
#[derive(Clone)]
pub struct ActiveSession {
    pub cluster: String,
    pub kind: ClusterKind,
    pub device_groups: Option<Vec<String>>,
    pub manager: Arc<dyn PolicyManager>,
    /// True when the HA peer, not the configured primary, is active.
    pub via_peer: bool,
}

impl std::fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSession")
            .field("cluster", &self.cluster)
            .field("kind", &self.kind)
            .field("hostname", &self.manager.hostname())
            .field("via_peer", &self.via_peer)
            .finish()
    }
}

/// Opens sessions and mints keys against the management API.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        kind: ClusterKind,
        endpoint: &Endpoint,
    ) -> ManagementResult<Arc<dyn PolicyManager>>;

    async fn generate_api_key(
        &self,
        kind: ClusterKind,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> ManagementResult<SecureString>;
}

/// Supplies credentials when a cluster has no stored key.
pub trait CredentialSource {
    fn credentials_for(&self, address: &str) -> std::io::Result<Credentials>;
}

/// Persists a minted key to durable configuration.
pub trait KeyStore {
    fn store_api_key(
        &mut self,
        kind: ClusterKind,
        cluster: &str,
        key: &SecureString,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Resolves one active session per configured cluster.
pub struct ConnectionResolver<'a> {
    factory: &'a dyn SessionFactory,
    credentials: &'a dyn CredentialSource,
}

impl<'a> ConnectionResolver<'a> {
    pub fn new(factory: &'a dyn SessionFactory, credentials: &'a dyn CredentialSource) -> Self {
        Self {
            factory,
            credentials,
        }
    }

    /// Resolves every cluster. Clusters that cannot be reached are logged and
    /// left out. Only a failure to mint a key is returned as an error.
    pub async fn resolve(
        &self,
        clusters: &mut [ManagedCluster],
        store: &mut dyn KeyStore,
    ) -> Result<Vec<ActiveSession>, ResolveError> {
        let mut sessions = Vec::with_capacity(clusters.len());
        for cluster in clusters.iter_mut() {
            info!("Connecting to {:?} {}", cluster.kind, cluster.name);
            if !cluster.primary.has_key() && !self.mint_key(cluster, store).await? {
                continue;
            }
            if let Some(session) = self.resolve_active(cluster).await {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    /// Mints and stores a key. Returns `false` when the key could not be
    /// persisted and the cluster should be skipped this cycle.
    async fn mint_key(
        &self,
        cluster: &mut ManagedCluster,
        store: &mut dyn KeyStore,
    ) -> Result<bool, ResolveError> {
        let address = cluster.primary.address.clone();
        info!("API key for {} is not configured", address);
        let credentials =
            self.credentials
                .credentials_for(&address)
                .map_err(|e| ResolveError::Credential {
                    address: address.clone(),
                    reason: e.to_string(),
                })?;

        let key = self
            .factory
            .generate_api_key(cluster.kind, &cluster.primary, &credentials)
            .await
            .map_err(|e| ResolveError::Credential {
                address: address.clone(),
                reason: e.to_string(),
            })?;
        info!(
            "API key generated for {} for user {}",
            address, credentials.username
        );

        cluster.primary.api_key = Some(key.clone());
        if let Err(e) = store.store_api_key(cluster.kind, &cluster.name, &key) {
            error!("Could not save API key for {}: {}", cluster.name, e);
            return Ok(false);
        }
        Ok(true)
    }

    async fn resolve_active(&self, cluster: &ManagedCluster) -> Option<ActiveSession> {
        let session = |manager: Arc<dyn PolicyManager>, via_peer: bool| ActiveSession {
            cluster: cluster.name.clone(),
            kind: cluster.kind,
            device_groups: cluster.device_groups.clone(),
            manager,
            via_peer,
        };

        let primary = match self.factory.open(cluster.kind, &cluster.primary).await {
            Ok(manager) => Some(manager),
            Err(e) => {
                error!("Could not initialize connection to {}: {}", cluster.name, e);
                None
            }
        };

        let Some(peer) = cluster.peer_endpoint() else {
            return primary.map(|m| session(m, false));
        };

        if let Some(manager) = &primary {
            match manager.ha_state().await {
                Ok(state) if state.serves_traffic() => {
                    info!("HA enabled. Active node is {}", manager.hostname());
                    return Some(session(Arc::clone(manager), false));
                }
                Ok(state) => info!("{} reports HA state {:?}", manager.hostname(), state),
                Err(e) => warn!("HA state query failed on {}: {}", manager.hostname(), e),
            }
        }

        let peer_manager = match self.factory.open(cluster.kind, &peer).await {
            Ok(manager) => manager,
            Err(e) => {
                error!("Could not initialize connection to HA peer {}: {}", peer.address, e);
                return None;
            }
        };
        match peer_manager.ha_state().await {
            Ok(HaState::Active) => {
                info!("HA enabled. Active node is {}", peer_manager.hostname());
                Some(session(peer_manager, true))
            }
            Ok(state) => {
                error!(
                    "No active node in cluster {} (peer {} reports {:?})",
                    cluster.name, peer.address, state
                );
                None
            }
            Err(e) => {
                error!("HA state query failed on peer {}: {}", peer.address, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_endpoint_shares_key() {
        let cluster = ManagedCluster {
            name: "10.0.0.10".to_string(),
            kind: ClusterKind::Panorama,
            primary: Endpoint {
                address: "10.0.0.10".to_string(),
                api_key: Some(SecureString::from("key")),
                timeout_secs: Some(120),
            },
            ha_peer: Some("10.0.0.11".to_string()),
            device_groups: None,
        };
        let peer = cluster.peer_endpoint().unwrap();
        assert_eq!(peer.address, "10.0.0.11");
        assert_eq!(peer.api_key, cluster.primary.api_key);
        assert_eq!(peer.timeout_secs, Some(120));
    }

    #[test]
    fn test_empty_key_is_missing() {
        let endpoint = Endpoint {
            address: "fw".to_string(),
            api_key: Some(SecureString::from("")),
            timeout_secs: None,
        };
        assert!(!endpoint.has_key());
    }
}
