//! Palo Alto Networks PAN-OS XML API.
//!
//! Covers the calls the shadow-rule engine needs from a firewall or Panorama:
//! key generation, operational commands, HA state, device groups, security
//! rulebases, rule tag/description edits and tag objects.

pub mod client;
pub mod connector;
pub mod ops;
pub mod rules;
pub mod xpath;

pub use client::PanosApi;
pub use connector::{
    default_timeout, PanosConfig, PanosConnector, PanosSessionFactory, API_KEY_HEADER,
};
