//! Config and metadata artifacts

use crate::{catalog::Region, tunnel::ProvisionedTunnel, Result, WgGenError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// WireGuard config file name
pub const CONFIG_FILE: &str = "wg0.conf";
/// Metadata file name
pub const METADATA_FILE: &str = "region-metadata.json";

const ALLOWED_IPS: &str = "0.0.0.0/0";
const PERSISTENT_KEEPALIVE: u16 = 25;

/// Render a `wg-quick` config
pub fn render_wireguard_config(tunnel: &ProvisionedTunnel) -> String {
    format!(
        "[Interface]\n\
         Address = {address}\n\
         PrivateKey = {private_key}\n\
         DNS = {dns}\n\
         \n\
         [Peer]\n\
         PublicKey = {server_key}\n\
         AllowedIPs = {allowed}\n\
         Endpoint = {endpoint}\n\
         PersistentKeepalive = {keepalive}\n",
        address = tunnel.peer_ip,
        private_key = tunnel.keys.private_key(),
        dns = tunnel.dns_servers.join(", "),
        server_key = tunnel.server_key,
        allowed = ALLOWED_IPS,
        endpoint = tunnel.endpoint_addr(),
        keepalive = PERSISTENT_KEEPALIVE,
    )
}

/// Selection metadata written next to the config
#[derive(Debug, Serialize)]
pub struct Metadata {
    /// UTC generation time, microsecond precision
    pub timestamp: String,
    /// Selected region
    pub region: RegionInfo,
    /// Server the key was registered with
    pub server: ServerInfo,
    /// Tunnel parameters
    pub config: ConfigInfo,
}

/// Region section of the metadata
#[derive(Debug, Serialize)]
pub struct RegionInfo {
    /// Region identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Country code
    pub country: String,
    /// Geo-located region
    pub geo: bool,
    /// Port forwarding support
    pub port_forward: bool,
    /// Provider DNS name
    pub dns: String,
}

/// Server section of the metadata
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// Certificate hostname
    pub hostname: String,
    /// Server address
    pub ip: String,
    /// WireGuard listening port
    pub port: u16,
    /// Server public key
    pub public_key: String,
}

/// Tunnel section of the metadata
#[derive(Debug, Serialize)]
pub struct ConfigInfo {
    /// Address assigned to this peer
    pub peer_ip: String,
    /// Resolvers inside the tunnel
    pub dns_servers: Vec<String>,
    /// Whether the run required port forwarding
    pub port_forwarding_enabled: bool,
}

impl Metadata {
    /// Describe a provisioned tunnel
    pub fn new(
        region: &Region,
        tunnel: &ProvisionedTunnel,
        port_forwarding_enabled: bool,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            region: RegionInfo {
                id: region.id.clone(),
                name: region.name.clone(),
                country: region.country.clone(),
                geo: region.geo,
                port_forward: region.port_forward,
                dns: region.dns.clone(),
            },
            server: ServerInfo {
                hostname: tunnel.endpoint.cn.clone(),
                ip: tunnel.endpoint.ip.to_string(),
                port: tunnel.server_port,
                public_key: tunnel.server_key.clone(),
            },
            config: ConfigInfo {
                peer_ip: tunnel.peer_ip.clone(),
                dns_servers: tunnel.dns_servers.clone(),
                port_forwarding_enabled,
            },
        }
    }
}

/// Paths of the written artifacts
#[derive(Debug, Clone)]
pub struct OutputPaths {
    /// `wg0.conf`
    pub config: PathBuf,
    /// `region-metadata.json`
    pub metadata: PathBuf,
}

/// Write `wg0.conf` and `region-metadata.json` into `dir`
pub fn write_outputs(
    dir: &Path,
    region: &Region,
    tunnel: &ProvisionedTunnel,
    port_forwarding_enabled: bool,
) -> Result<OutputPaths> {
    std::fs::create_dir_all(dir)
        .map_err(|e| WgGenError::Output(format!("failed to create {}: {}", dir.display(), e)))?;

    let config = dir.join(CONFIG_FILE);
    std::fs::write(&config, render_wireguard_config(tunnel))
        .map_err(|e| WgGenError::Output(format!("failed to write {}: {}", config.display(), e)))?;
    tracing::info!("WireGuard configuration written to {}", config.display());

    let metadata = dir.join(METADATA_FILE);
    let record = Metadata::new(region, tunnel, port_forwarding_enabled, Utc::now());
    let content = serde_json::to_string_pretty(&record)
        .map_err(|e| WgGenError::Output(format!("failed to encode metadata: {}", e)))?;
    std::fs::write(&metadata, content)
        .map_err(|e| WgGenError::Output(format!("failed to write {}: {}", metadata.display(), e)))?;
    tracing::info!("Metadata written to {}", metadata.display());

    Ok(OutputPaths { config, metadata })
}
