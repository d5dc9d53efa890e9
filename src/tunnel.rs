//! WireGuard key provisioning
//!
//! Generates a key pair locally and registers the public half with the
//! region's WireGuard server, which answers with the peer address and its
//! own key. Either the whole exchange succeeds or the run fails; there is no
//! partially provisioned tunnel.

use crate::{
    catalog::{Region, ServerEndpoint},
    Result, WgGenError,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Port of the key registration service on WireGuard servers
pub const PROVISIONING_PORT: u16 = 1337;

const PROVISIONING_TIMEOUT: Duration = Duration::from_secs(30);

/// WireGuard key pair, base64 encoded
#[derive(Clone)]
pub struct KeyPair {
    private_key: String,
    public_key: String,
}

impl KeyPair {
    /// Generate a fresh X25519 key pair
    pub fn generate() -> Self {
        let private = x25519_dalek::StaticSecret::random_from_rng(rand::thread_rng());
        let public = x25519_dalek::PublicKey::from(&private);

        Self {
            private_key: STANDARD.encode(private.as_bytes()),
            public_key: STANDARD.encode(public.as_bytes()),
        }
    }

    /// Base64 private key
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Base64 public key
    pub fn public_key(&self) -> &str {
        &self.public_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Body returned by `/addKey`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddKeyResponse {
    /// `OK` on success
    pub status: Option<String>,
    /// Server-provided reason on failure
    pub message: Option<String>,
    /// Address assigned to this peer
    pub peer_ip: Option<String>,
    /// Server public key
    pub server_key: Option<String>,
    /// Server listening port
    pub server_port: Option<u16>,
    /// Resolvers to use inside the tunnel
    pub dns_servers: Option<Vec<String>>,
}

/// Negotiated tunnel, ready to be rendered
#[derive(Debug, Clone)]
pub struct ProvisionedTunnel {
    /// Local key pair
    pub keys: KeyPair,
    /// Server the key was registered with
    pub endpoint: ServerEndpoint,
    /// Address assigned to this peer
    pub peer_ip: String,
    /// Server public key
    pub server_key: String,
    /// Server listening port
    pub server_port: u16,
    /// Resolvers to use inside the tunnel
    pub dns_servers: Vec<String>,
}

impl ProvisionedTunnel {
    /// Validate an `/addKey` response and combine it with the local keys
    pub fn from_response(
        keys: KeyPair,
        endpoint: ServerEndpoint,
        response: AddKeyResponse,
    ) -> Result<Self> {
        if response.status.as_deref() != Some("OK") {
            let status = response.status.unwrap_or_else(|| "<missing>".into());
            let reason = response.message.map(|m| format!(": {}", m)).unwrap_or_default();
            return Err(WgGenError::ProvisioningProtocol(format!(
                "server returned status {}{}",
                status, reason
            )));
        }

        let peer_ip = response.peer_ip.ok_or_else(|| missing_field("peer_ip"))?;
        let server_key = response.server_key.ok_or_else(|| missing_field("server_key"))?;
        let server_port = response.server_port.ok_or_else(|| missing_field("server_port"))?;

        Ok(Self {
            keys,
            endpoint,
            peer_ip,
            server_key,
            server_port,
            dns_servers: response.dns_servers.unwrap_or_default(),
        })
    }

    /// `ip:port` of the WireGuard server
    pub fn endpoint_addr(&self) -> SocketAddr {
        SocketAddr::new(self.endpoint.ip, self.server_port)
    }
}

fn missing_field(name: &str) -> WgGenError {
    WgGenError::ProvisioningProtocol(format!("response is missing {}", name))
}

/// Key registration service
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    /// Register `public_key` with `endpoint`, authenticated by `token`
    async fn add_key(
        &self,
        endpoint: &ServerEndpoint,
        token: &str,
        public_key: &str,
    ) -> Result<AddKeyResponse>;
}

/// `/addKey` over HTTPS, addressed by IP.
///
/// The server certificate is issued for the endpoint hostname, not its IP,
/// so certificate validation is disabled and the hostname travels in the
/// `Host` header instead. Trust rests on the auth token and the published
/// server list.
pub struct HttpsProvisioningApi {
    client: reqwest::Client,
    scheme: &'static str,
    port: u16,
}

impl HttpsProvisioningApi {
    /// Client for the standard service port
    pub fn new() -> Result<Self> {
        Self::with_port(PROVISIONING_PORT)
    }

    /// Use a non-standard service port
    pub fn with_port(port: u16) -> Result<Self> {
        Self::with_base("https", port)
    }

    /// Use another URL scheme, e.g. `http` against a local test server
    pub fn with_base(scheme: &'static str, port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROVISIONING_TIMEOUT)
            .use_rustls_tls()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| WgGenError::KeyExchange(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            scheme,
            port,
        })
    }
}

#[async_trait]
impl ProvisioningApi for HttpsProvisioningApi {
    async fn add_key(
        &self,
        endpoint: &ServerEndpoint,
        token: &str,
        public_key: &str,
    ) -> Result<AddKeyResponse> {
        let addr = SocketAddr::new(endpoint.ip, self.port);
        let url = format!("{}://{}/addKey", self.scheme, addr);
        tracing::debug!("Registering key with {} ({})", endpoint.cn, url);

        let response = self
            .client
            .get(&url)
            .query(&[("pt", token), ("pubkey", public_key)])
            .header(reqwest::header::HOST, endpoint.cn.as_str())
            .send()
            .await
            .map_err(|e| WgGenError::KeyExchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("addKey error {}: {}", status, error_text);
            return Err(WgGenError::KeyExchange(format!("HTTP {}", status)));
        }

        response.json::<AddKeyResponse>().await.map_err(|e| {
            WgGenError::ProvisioningProtocol(format!("failed to parse response: {}", e))
        })
    }
}

/// Provisions a tunnel with a selected region
pub struct KeyProvisioner {
    api: Arc<dyn ProvisioningApi>,
}

impl KeyProvisioner {
    /// Provision through `api`
    pub fn new(api: Arc<dyn ProvisioningApi>) -> Self {
        Self { api }
    }

    /// Register a fresh key with the region's first WireGuard server
    pub async fn provision(&self, region: &Region, token: &str) -> Result<ProvisionedTunnel> {
        tracing::info!("Generating WireGuard configuration...");

        let endpoint = region
            .wg_endpoint()
            .cloned()
            .ok_or_else(|| WgGenError::NoProvisioningEndpoint(region.id.clone()))?;

        let keys = KeyPair::generate();
        let response = self.api.add_key(&endpoint, token, keys.public_key()).await?;
        let tunnel = ProvisionedTunnel::from_response(keys, endpoint, response)?;

        tracing::info!(
            "Successfully generated WireGuard configuration (server {}, peer {})",
            tunnel.endpoint.cn,
            tunnel.peer_ip
        );
        Ok(tunnel)
    }
}
