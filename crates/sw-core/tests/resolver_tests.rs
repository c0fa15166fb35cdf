//! Integration tests for active-endpoint resolution.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use sw_core::{
    ClusterKind, ConnectionResolver, CredentialSource, Credentials, Endpoint, HaState, KeyStore,
    ManagedCluster, ManagementError, ManagementResult, MockPolicyManager, PolicyManager,
    ResolveError, SecureString, SessionFactory,
};

/// Opens pre-registered mock managers by address.
#[derive(Default)]
struct FakeFactory {
    nodes: HashMap<String, MockPolicyManager>,
    keygen_fails: bool,
    opened: Mutex<Vec<String>>,
}

impl FakeFactory {
    async fn node(mut self, address: &str, state: ManagementResult<HaState>) -> Self {
        let m = MockPolicyManager::new(address, ClusterKind::Panorama);
        m.set_ha_state(state).await;
        self.nodes.insert(address.to_string(), m);
        self
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(
        &self,
        _kind: ClusterKind,
        endpoint: &Endpoint,
    ) -> ManagementResult<Arc<dyn PolicyManager>> {
        self.opened.lock().unwrap().push(endpoint.address.clone());
        match self.nodes.get(&endpoint.address) {
            Some(m) => Ok(Arc::new(m.clone())),
            None => Err(ManagementError::Connection(endpoint.address.clone())),
        }
    }

    async fn generate_api_key(
        &self,
        _kind: ClusterKind,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> ManagementResult<SecureString> {
        if self.keygen_fails {
            return Err(ManagementError::Authentication("invalid credentials".to_string()));
        }
        Ok(SecureString::from(format!(
            "key-{}-{}",
            endpoint.address, credentials.username
        )))
    }
}

struct FixedCredentials;

impl CredentialSource for FixedCredentials {
    fn credentials_for(&self, _address: &str) -> std::io::Result<Credentials> {
        Ok(Credentials {
            username: "admin".to_string(),
            password: SecureString::from("secret"),
        })
    }
}

#[derive(Default)]
struct MemoryStore {
    stored: Vec<(String, String)>,
    fail: bool,
}

impl KeyStore for MemoryStore {
    fn store_api_key(
        &mut self,
        _kind: ClusterKind,
        cluster: &str,
        key: &SecureString,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err("read-only config".into());
        }
        self.stored
            .push((cluster.to_string(), key.expose_secret().to_string()));
        Ok(())
    }
}

fn cluster(primary: &str, peer: Option<&str>, key: Option<&str>) -> ManagedCluster {
    ManagedCluster {
        name: primary.to_string(),
        kind: ClusterKind::Panorama,
        primary: Endpoint {
            address: primary.to_string(),
            api_key: key.map(SecureString::from),
            timeout_secs: Some(120),
        },
        ha_peer: peer.map(str::to_string),
        device_groups: None,
    }
}

#[tokio::test]
async fn standalone_primary_is_used() {
    let factory = FakeFactory::default()
        .node("10.0.0.10", Ok(HaState::Disabled))
        .await;
    let resolver = ConnectionResolver::new(&factory, &FixedCredentials);
    let mut clusters = vec![cluster("10.0.0.10", None, Some("k"))];

    let sessions = resolver
        .resolve(&mut clusters, &mut MemoryStore::default())
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].manager.hostname(), "10.0.0.10");
    assert!(!sessions[0].via_peer);
}

#[tokio::test]
async fn active_primary_wins_without_opening_peer() {
    let factory = FakeFactory::default()
        .node("10.0.0.10", Ok(HaState::Active))
        .await
        .node("10.0.0.11", Ok(HaState::Passive))
        .await;
    let resolver = ConnectionResolver::new(&factory, &FixedCredentials);
    let mut clusters = vec![cluster("10.0.0.10", Some("10.0.0.11"), Some("k"))];

    let sessions = resolver
        .resolve(&mut clusters, &mut MemoryStore::default())
        .await
        .unwrap();
    assert_eq!(sessions[0].manager.hostname(), "10.0.0.10");
    assert_eq!(*factory.opened.lock().unwrap(), vec!["10.0.0.10"]);
}

#[tokio::test]
async fn passive_primary_fails_over_to_active_peer() {
    let factory = FakeFactory::default()
        .node("10.0.0.10", Ok(HaState::Passive))
        .await
        .node("10.0.0.11", Ok(HaState::Active))
        .await;
    let resolver = ConnectionResolver::new(&factory, &FixedCredentials);
    let mut clusters = vec![cluster("10.0.0.10", Some("10.0.0.11"), Some("k"))];

    let sessions = resolver
        .resolve(&mut clusters, &mut MemoryStore::default())
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].manager.hostname(), "10.0.0.11");
    assert!(sessions[0].via_peer);
    assert_eq!(sessions[0].cluster, "10.0.0.10");
}

#[tokio::test]
async fn unreachable_primary_fails_over_to_peer() {
    let factory = FakeFactory::default()
        .node("10.0.0.11", Ok(HaState::Active))
        .await;
    let resolver = ConnectionResolver::new(&factory, &FixedCredentials);
    let mut clusters = vec![cluster("10.0.0.10", Some("10.0.0.11"), Some("k"))];

    let sessions = resolver
        .resolve(&mut clusters, &mut MemoryStore::default())
        .await
        .unwrap();
    assert_eq!(sessions[0].manager.hostname(), "10.0.0.11");
}

#[tokio::test]
async fn cluster_without_active_node_is_excluded() {
    let factory = FakeFactory::default()
        .node("10.0.0.10", Ok(HaState::Passive))
        .await
        .node("10.0.0.11", Ok(HaState::Other("suspended".to_string())))
        .await
        .node("10.0.0.20", Ok(HaState::Disabled))
        .await;
    let resolver = ConnectionResolver::new(&factory, &FixedCredentials);
    let mut clusters = vec![
        cluster("10.0.0.10", Some("10.0.0.11"), Some("k")),
        cluster("10.0.0.20", None, Some("k")),
    ];

    let sessions = resolver
        .resolve(&mut clusters, &mut MemoryStore::default())
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].cluster, "10.0.0.20");
}

#[tokio::test]
async fn missing_key_is_minted_and_persisted() {
    let factory = FakeFactory::default()
        .node("10.0.0.10", Ok(HaState::Disabled))
        .await;
    let resolver = ConnectionResolver::new(&factory, &FixedCredentials);
    let mut clusters = vec![cluster("10.0.0.10", None, None)];
    let mut store = MemoryStore::default();

    let sessions = resolver.resolve(&mut clusters, &mut store).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(
        store.stored,
        vec![("10.0.0.10".to_string(), "key-10.0.0.10-admin".to_string())]
    );
    assert_eq!(
        clusters[0].primary.api_key.as_ref().unwrap().expose_secret(),
        "key-10.0.0.10-admin"
    );
}

#[tokio::test]
async fn persist_failure_skips_cluster() {
    let factory = FakeFactory::default()
        .node("10.0.0.10", Ok(HaState::Disabled))
        .await;
    let resolver = ConnectionResolver::new(&factory, &FixedCredentials);
    let mut clusters = vec![cluster("10.0.0.10", None, None)];
    let mut store = MemoryStore {
        fail: true,
        ..Default::default()
    };

    let sessions = resolver.resolve(&mut clusters, &mut store).await.unwrap();
    assert!(sessions.is_empty());
    // The key is kept in memory for the next cycle.
    assert!(clusters[0].primary.has_key());
}

#[tokio::test]
async fn keygen_failure_is_fatal() {
    let mut factory = FakeFactory::default()
        .node("10.0.0.10", Ok(HaState::Disabled))
        .await;
    factory.keygen_fails = true;
    let resolver = ConnectionResolver::new(&factory, &FixedCredentials);
    let mut clusters = vec![cluster("10.0.0.10", None, None)];

    let err = resolver
        .resolve(&mut clusters, &mut MemoryStore::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::Credential { ref address, .. } if address == "10.0.0.10"));
}
