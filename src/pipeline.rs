//! Pipeline orchestration
//!
//! Fetch catalog, select region, provision keys. Each stage starts only once
//! the previous one has produced its result, and any stage error ends the
//! run.

use crate::{
    catalog::{Catalog, CatalogFetcher, Region},
    config::Settings,
    probe::{LatencyProber, TcpProber},
    selector::RegionSelector,
    tunnel::{HttpsProvisioningApi, KeyProvisioner, ProvisionedTunnel},
    Result,
};
use std::sync::Arc;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct Selection {
    /// Region that was chosen
    pub region: Region,
    /// Tunnel provisioned with it
    pub tunnel: ProvisionedTunnel,
}

/// Catalog → selection → provisioning
pub struct Pipeline {
    fetcher: CatalogFetcher,
    selector: RegionSelector,
    provisioner: KeyProvisioner,
    preferred_region: Option<String>,
    port_forward: bool,
}

impl Pipeline {
    /// Assemble a pipeline from its stages
    pub fn new(
        fetcher: CatalogFetcher,
        selector: RegionSelector,
        provisioner: KeyProvisioner,
        preferred_region: Option<String>,
        port_forward: bool,
    ) -> Self {
        Self {
            fetcher,
            selector,
            provisioner,
            preferred_region,
            port_forward,
        }
    }

    /// Wire the network-backed stages from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fetcher = CatalogFetcher::new(settings.serverlist_url.clone())?;
        let prober = LatencyProber::new(
            Arc::new(TcpProber::new()),
            settings.max_latency,
            settings.probe_concurrency,
        );
        let provisioner = KeyProvisioner::new(Arc::new(HttpsProvisioningApi::new()?));

        Ok(Self::new(
            fetcher,
            RegionSelector::new(prober),
            provisioner,
            settings.preferred_region.clone(),
            settings.port_forward,
        ))
    }

    /// Run every stage against the live catalog
    pub async fn run(&self, token: &str) -> Result<Selection> {
        let catalog = self.fetcher.fetch().await?;
        self.run_with_catalog(&catalog, token).await
    }

    /// Select and provision from an already fetched catalog
    pub async fn run_with_catalog(&self, catalog: &Catalog, token: &str) -> Result<Selection> {
        let region = self
            .selector
            .select(catalog, self.preferred_region.as_deref(), self.port_forward)
            .await?;
        let tunnel = self.provisioner.provision(&region, token).await?;

        Ok(Selection { region, tunnel })
    }
}
