//! # sw-connectors
//!
//! PAN-OS XML API connector for Shadow Warden.
//!
//! This crate implements the `sw-core` session seams (`PolicyManager`,
//! `SessionFactory`) against real firewalls and Panorama over HTTPS.

pub mod http;
pub mod panos;
pub mod traits;
pub mod xml;

#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpClient;
pub use panos::{PanosConfig, PanosConnector, PanosSessionFactory};
pub use traits::{AuthConfig, ConnectorConfig, ConnectorError, ConnectorResult, XmlTransport};
