//! Server Catalog
//!
//! The provider publishes its region list as a JSON document immediately
//! followed by a signature blob, with no delimiter between the two. The
//! parser recovers the JSON by trimming the tail back to the rightmost `}`
//! that yields a document with a `regions` field.

use crate::{Result, WgGenError};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Default server list location
pub const DEFAULT_SERVERLIST_URL: &str = "https://serverlist.piaservers.net/vpninfo/servers/v6";

/// Payloads shorter than this are never a real catalog
pub const MIN_CATALOG_BYTES: usize = 1000;

/// How far back from the end of the body the parser looks for the JSON end
pub const SCAN_WINDOW: usize = 10_000;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A server inside a region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Address the server is reached on
    pub ip: IpAddr,
    /// Hostname the server's certificate is issued for
    pub cn: String,
}

/// Server groups advertised for a region
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionServers {
    /// Metadata servers, used for latency probing
    #[serde(default)]
    pub meta: Vec<ServerEndpoint>,
    /// WireGuard servers, used for key provisioning
    #[serde(default)]
    pub wg: Vec<ServerEndpoint>,
}

/// A selectable provider region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Unique identifier within a catalog
    pub id: String,
    /// Display name
    pub name: String,
    /// Country code
    #[serde(default)]
    pub country: String,
    /// Provider DNS name for the region
    #[serde(default)]
    pub dns: String,
    /// Geo-located proxy rather than a physical location
    #[serde(default)]
    pub geo: bool,
    /// Port forwarding support
    #[serde(default)]
    pub port_forward: bool,
    /// Servers by role
    #[serde(default)]
    pub servers: RegionServers,
}

impl Region {
    /// First metadata server, the probe target for this region
    pub fn meta_endpoint(&self) -> Option<&ServerEndpoint> {
        self.servers.meta.first()
    }

    /// First WireGuard server, the provisioning target for this region
    pub fn wg_endpoint(&self) -> Option<&ServerEndpoint> {
        self.servers.wg.first()
    }

    /// `id (name)` label used in diagnostics
    pub fn label(&self) -> String {
        format!("{} ({})", self.id, self.name)
    }
}

/// Regions as published in one fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Regions in publication order
    pub regions: Vec<Region>,
}

impl Catalog {
    /// Look up a region by identifier
    pub fn find(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// Labels of the first `limit` regions
    pub fn sample(&self, limit: usize) -> Vec<String> {
        self.regions.iter().take(limit).map(Region::label).collect()
    }

    /// Number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the catalog has no regions
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Parse a catalog body that may carry trailing non-JSON bytes
pub fn parse_catalog(body: &[u8]) -> Result<Catalog> {
    if body.len() < MIN_CATALOG_BYTES {
        return Err(WgGenError::CatalogParse(format!(
            "payload too short ({} bytes, need at least {})",
            body.len(),
            MIN_CATALOG_BYTES
        )));
    }

    let floor = body.len().saturating_sub(SCAN_WINDOW);
    for end in (floor..body.len()).rev() {
        if body[end] != b'}' {
            continue;
        }
        if let Ok(catalog) = serde_json::from_slice::<Catalog>(&body[..=end]) {
            tracing::debug!("Catalog JSON ends at byte {} of {}", end + 1, body.len());
            return Ok(catalog);
        }
    }

    tracing::debug!("No JSON boundary found in trailing window, parsing whole body");
    serde_json::from_slice::<Catalog>(body).map_err(|e| WgGenError::CatalogParse(e.to_string()))
}

/// Downloads and parses the server catalog
pub struct CatalogFetcher {
    client: reqwest::Client,
    url: String,
}

impl CatalogFetcher {
    /// Create a fetcher for the given server list URL
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|e| WgGenError::CatalogFetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Server list URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the catalog
    pub async fn fetch(&self) -> Result<Catalog> {
        tracing::info!("Getting server list...");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| WgGenError::CatalogFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WgGenError::CatalogFetch(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| WgGenError::CatalogFetch(e.to_string()))?;

        let catalog = parse_catalog(&body)?;
        tracing::info!("Successfully retrieved server list ({} regions)", catalog.len());
        Ok(catalog)
    }
}
