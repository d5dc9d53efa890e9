//! Latency probing
//!
//! Fans out one probe per candidate region over a bounded pool and collects
//! the ones that answer in time. A failed probe is not an error, it simply
//! produces no result.

use crate::{catalog::Region, Result, WgGenError};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Port probed on metadata servers
pub const PROBE_PORT: u16 = 443;

/// Default cap on in-flight probes
pub const DEFAULT_PROBE_CONCURRENCY: usize = 20;

/// A single connectivity check
#[async_trait]
pub trait Prober: Send + Sync {
    /// Measure round-trip time to `ip`, or `None` if it did not answer within `timeout`
    async fn probe(&self, ip: IpAddr, timeout: Duration) -> Option<Duration>;
}

/// Measures the time to complete a TCP connect
pub struct TcpProber {
    port: u16,
}

impl TcpProber {
    /// Probe the standard port
    pub fn new() -> Self {
        Self { port: PROBE_PORT }
    }

    /// Probe a port other than 443
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, ip: IpAddr, timeout: Duration) -> Option<Duration> {
        let addr = SocketAddr::new(ip, self.port);
        let start = Instant::now();

        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Some(start.elapsed()),
            Ok(Err(e)) => {
                tracing::trace!("Probe to {} failed: {}", addr, e);
                None
            }
            Err(_) => {
                tracing::trace!("Probe to {} timed out", addr);
                None
            }
        }
    }
}

/// A region queued for probing
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    /// Region identifier
    pub region_id: String,
    /// Region display name
    pub region_name: String,
    /// Geo-located region
    pub geo: bool,
    /// Metadata server address
    pub ip: IpAddr,
    /// Position of the region in the catalog
    pub position: usize,
}

impl ProbeTarget {
    /// Target the first metadata server of `region`, if it has one
    pub fn from_region(position: usize, region: &Region) -> Option<Self> {
        let meta = region.meta_endpoint()?;
        Some(Self {
            region_id: region.id.clone(),
            region_name: region.name.clone(),
            geo: region.geo,
            ip: meta.ip,
            position,
        })
    }
}

/// A probe that answered in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Region identifier
    pub region_id: String,
    /// Measured round-trip time
    pub latency: Duration,
    /// Position of the region in the catalog
    pub position: usize,
}

/// Bounded concurrent prober
pub struct LatencyProber {
    prober: Arc<dyn Prober>,
    timeout: Duration,
    concurrency: usize,
}

impl LatencyProber {
    /// Create a prober running at most `concurrency` probes at once
    pub fn new(prober: Arc<dyn Prober>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            prober,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Per-probe timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe every target and return the ones that answered.
    ///
    /// All probes run to completion; there is no early exit once a fast
    /// region has been seen. Results come back in completion order.
    pub async fn measure(&self, targets: Vec<ProbeTarget>) -> Result<Vec<ProbeResult>> {
        let submitted = targets.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for target in targets {
            let prober = self.prober.clone();
            let semaphore = semaphore.clone();
            let timeout = self.timeout;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let latency = tokio::time::timeout(timeout, prober.probe(target.ip, timeout))
                    .await
                    .ok()
                    .flatten()?;
                if latency > timeout {
                    return None;
                }
                Some((target, latency))
            });
        }

        let mut results = Vec::with_capacity(submitted);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((target, latency))) => {
                    let geo_suffix = if target.geo { " (geo)" } else { "" };
                    tracing::info!(
                        "Got latency {:.3}s for region: {}{}",
                        latency.as_secs_f64(),
                        target.region_name,
                        geo_suffix
                    );
                    results.push(ProbeResult {
                        region_id: target.region_id,
                        latency,
                        position: target.position,
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Probe task failed: {}", e),
            }
        }

        tracing::debug!("{} of {} probes answered", results.len(), submitted);

        if results.is_empty() {
            return Err(WgGenError::NoReachableRegion(self.timeout));
        }
        Ok(results)
    }
}
