//! wggen - WireGuard Region Selection and Provisioning
//!
//! Picks the lowest-latency region from the provider's server catalog,
//! registers a fresh key pair with it and hands back everything needed to
//! render a `wg-quick` configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               WGGEN RUN                                 │
//! │                                                                         │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐                 │
//! │  │   Catalog    │──▶│    Region    │──▶│     Key      │──▶ Provisioned  │
//! │  │   Fetcher    │   │   Selector   │   │ Provisioner  │    Tunnel       │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘                 │
//! │                            │                                            │
//! │                     ┌──────▼───────┐                                    │
//! │                     │   Latency    │  bounded fan-out,                  │
//! │                     │   Prober     │  single collector                  │
//! │                     └──────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stages run strictly one after another. The prober is the only place
//! where work happens concurrently.

#![warn(missing_docs)]

pub mod auth;
pub mod catalog;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod selector;
pub mod tunnel;

use std::time::Duration;
use thiserror::Error;

pub use catalog::{Catalog, CatalogFetcher, Region, ServerEndpoint};
pub use config::{Cli, Settings};
pub use pipeline::{Pipeline, Selection};
pub use probe::{LatencyProber, ProbeResult, ProbeTarget, Prober, TcpProber};
pub use selector::RegionSelector;
pub use tunnel::{
    HttpsProvisioningApi, KeyPair, KeyProvisioner, ProvisionedTunnel, ProvisioningApi,
};

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, WgGenError>;

/// Generator error types
#[derive(Debug, Error)]
pub enum WgGenError {
    /// Missing or invalid settings
    #[error("config error: {0}")]
    Config(String),
    /// Token request failed
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Server list could not be downloaded
    #[error("failed to fetch server list: {0}")]
    CatalogFetch(String),
    /// Server list body is not a usable catalog
    #[error("failed to parse server list: {0}")]
    CatalogParse(String),
    /// Preferred region is not in the catalog
    #[error(
        "preferred region {region} not found; available regions (first 10): {}",
        .available.join(", ")
    )]
    UnknownRegion {
        /// Identifier that was asked for
        region: String,
        /// Sample of `id (name)` entries from the catalog
        available: Vec<String>,
    },
    /// Preferred region lacks port forwarding
    #[error("region {0} does not support port forwarding")]
    CapabilityMismatch(String),
    /// Nothing left after capability filtering
    #[error("no suitable regions found")]
    NoSuitableRegion,
    /// Every probe failed or timed out
    #[error("no regions responded within {:.3}s", .0.as_secs_f64())]
    NoReachableRegion(Duration),
    /// Winning probe does not map back to a candidate
    #[error("selected region {0} vanished from the candidate set")]
    SelectionConsistency(String),
    /// Selected region has no WireGuard server
    #[error("no WireGuard servers available for region {0}")]
    NoProvisioningEndpoint(String),
    /// `/addKey` transport failure or non-2xx status
    #[error("key exchange failed: {0}")]
    KeyExchange(String),
    /// `/addKey` answered with an unusable body
    #[error("provisioning protocol error: {0}")]
    ProvisioningProtocol(String),
    /// Config or metadata could not be written
    #[error("output error: {0}")]
    Output(String),
}

impl WgGenError {
    /// Name of the pipeline stage that produced this error
    pub fn stage(&self) -> &'static str {
        match self {
            WgGenError::Config(_) => "config",
            WgGenError::Auth(_) => "auth",
            WgGenError::CatalogFetch(_) | WgGenError::CatalogParse(_) => "catalog",
            WgGenError::UnknownRegion { .. }
            | WgGenError::CapabilityMismatch(_)
            | WgGenError::NoSuitableRegion
            | WgGenError::NoReachableRegion(_)
            | WgGenError::SelectionConsistency(_) => "selection",
            WgGenError::NoProvisioningEndpoint(_)
            | WgGenError::KeyExchange(_)
            | WgGenError::ProvisioningProtocol(_) => "provisioning",
            WgGenError::Output(_) => "output",
        }
    }
}
