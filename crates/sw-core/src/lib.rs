//! # sw-core
//!
//! Shadow-rule analysis engine for PAN-OS firewalls and Panorama.
//!
//! This crate resolves the active node of each managed cluster, groups
//! shadowed security rules under a content-derived tag, scores rule laxity,
//! and reconciles tags and comments on the live rules. It talks to the
//! management server only through the traits in [`manager`] and
//! [`resolver`]; `sw-connectors` provides the PAN-OS implementation.

pub mod annotate;
pub mod error;
pub mod manager;
pub mod mock;
pub mod orchestrator;
pub mod resolver;
pub mod risk;
pub mod rule;
pub mod secret;
pub mod shadow;

pub use annotate::{AnnotationFailure, AnnotationReport, Annotator, RiskTarget};
pub use error::{ManagementError, ManagementResult, ResolveError};
pub use manager::{
    ClusterKind, DeviceGroup, HaState, PolicyManager, RuleRepository, ShadowTarget, TagObject,
    TagOutcome,
};
pub use mock::MockPolicyManager;
pub use orchestrator::{
    run_cycle, shutdown_channel, CycleOptions, CycleReport, DeviceGroupReport, Shutdown,
    ShutdownTrigger,
};
pub use resolver::{
    ActiveSession, ConnectionResolver, CredentialSource, Credentials, Endpoint, KeyStore,
    ManagedCluster, SessionFactory,
};
pub use risk::{score_rule, LaxityPredicates, RiskScore};
pub use rule::{Rule, RulePosition};
pub use secret::SecureString;
pub use shadow::{
    discover_shadow_groups, shadow_count, MemberOrder, ShadowDiscovery, ShadowGroup,
    ShadowRelation,
};
