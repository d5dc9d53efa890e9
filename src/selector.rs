//! Region selection

use crate::{
    catalog::{Catalog, Region},
    probe::{LatencyProber, ProbeResult, ProbeTarget},
    Result, WgGenError,
};

/// Number of catalog entries listed when a preferred region is unknown
pub const UNKNOWN_REGION_SAMPLE: usize = 10;

/// Chooses one region from a catalog
pub struct RegionSelector {
    prober: LatencyProber,
}

impl RegionSelector {
    /// Select using `prober` for latency measurements
    pub fn new(prober: LatencyProber) -> Self {
        Self { prober }
    }

    /// Select a region.
    ///
    /// A preferred region is returned as-is, after the port forwarding check,
    /// without probing anything. Otherwise every candidate is probed and the
    /// fastest responder wins, with ties going to the region listed first.
    pub async fn select(
        &self,
        catalog: &Catalog,
        preference: Option<&str>,
        require_port_forward: bool,
    ) -> Result<Region> {
        if let Some(preferred) = preference {
            return select_preferred(catalog, preferred, require_port_forward);
        }

        let candidates: Vec<&Region> = if require_port_forward {
            tracing::info!("Port Forwarding enabled, filtering PF-capable regions");
            catalog.regions.iter().filter(|r| r.port_forward).collect()
        } else {
            catalog.regions.iter().collect()
        };

        if candidates.is_empty() {
            return Err(WgGenError::NoSuitableRegion);
        }

        tracing::info!("Testing {} regions for latency...", candidates.len());

        let targets: Vec<ProbeTarget> = candidates
            .iter()
            .enumerate()
            .filter_map(|(position, region)| {
                let target = ProbeTarget::from_region(position, region);
                if target.is_none() {
                    tracing::debug!("Region {} has no metadata server, skipping", region.id);
                }
                target
            })
            .collect();

        let mut results = self.prober.measure(targets).await?;
        rank(&mut results);
        let best = results
            .first()
            .ok_or_else(|| WgGenError::NoReachableRegion(self.prober.timeout()))?;

        let region = candidates
            .iter()
            .find(|r| r.id == best.region_id)
            .ok_or_else(|| WgGenError::SelectionConsistency(best.region_id.clone()))?;

        tracing::info!(
            "Selected region: {} (latency: {:.3}s)",
            region.name,
            best.latency.as_secs_f64()
        );
        Ok((*region).clone())
    }
}

fn select_preferred(
    catalog: &Catalog,
    preferred: &str,
    require_port_forward: bool,
) -> Result<Region> {
    let region = catalog.find(preferred).ok_or_else(|| WgGenError::UnknownRegion {
        region: preferred.to_string(),
        available: catalog.sample(UNKNOWN_REGION_SAMPLE),
    })?;

    if require_port_forward && !region.port_forward {
        return Err(WgGenError::CapabilityMismatch(region.id.clone()));
    }

    tracing::info!("Using preferred region: {}", region.name);
    Ok(region.clone())
}

/// Order results fastest first; equal latencies keep catalog order
pub fn rank(results: &mut [ProbeResult]) {
    results.sort_by(|a, b| a.latency.cmp(&b.latency).then(a.position.cmp(&b.position)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::region;
    use crate::probe::Prober;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Returns scripted latencies per address and counts calls
    struct ScriptedProber {
        latencies: HashMap<IpAddr, Duration>,
        calls: AtomicUsize,
        probed: std::sync::Mutex<Vec<IpAddr>>,
    }

    impl ScriptedProber {
        fn new(entries: &[(&str, u64)]) -> Arc<Self> {
            Arc::new(Self {
                latencies: entries
                    .iter()
                    .map(|(ip, ms)| (ip.parse().unwrap(), Duration::from_millis(*ms)))
                    .collect(),
                calls: AtomicUsize::new(0),
                probed: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, ip: IpAddr, _timeout: Duration) -> Option<Duration> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.probed.lock().unwrap().push(ip);
            self.latencies.get(&ip).copied()
        }
    }

    fn selector(prober: Arc<ScriptedProber>) -> RegionSelector {
        RegionSelector::new(LatencyProber::new(prober, Duration::from_millis(100), 20))
    }

    fn catalog() -> Catalog {
        Catalog {
            regions: vec![
                region("us-east", false, "10.0.0.1"),
                region("us-west", true, "10.0.0.2"),
                region("ca-toronto", true, "10.0.0.3"),
                region("uk-london", false, "10.0.0.4"),
            ],
        }
    }

    #[tokio::test]
    async fn test_preferred_region_skips_probing() {
        let prober = ScriptedProber::new(&[("10.0.0.1", 1)]);
        let chosen = selector(prober.clone())
            .select(&catalog(), Some("uk-london"), false)
            .await
            .unwrap();
        assert_eq!(chosen.id, "uk-london");
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_preferred_region_capability_mismatch() {
        let prober = ScriptedProber::new(&[("10.0.0.1", 1)]);
        let err = selector(prober.clone())
            .select(&catalog(), Some("us-east"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, WgGenError::CapabilityMismatch(ref id) if id == "us-east"));
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_preferred_region_with_capability() {
        let prober = ScriptedProber::new(&[]);
        let chosen = selector(prober.clone())
            .select(&catalog(), Some("ca-toronto"), true)
            .await
            .unwrap();
        assert_eq!(chosen.id, "ca-toronto");
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_preferred_region() {
        let mut big = catalog();
        for i in 0..12 {
            big.regions.push(region(&format!("extra-{}", i), false, "10.0.1.1"));
        }
        let prober = ScriptedProber::new(&[]);
        let err = selector(prober.clone())
            .select(&big, Some("eu-central"), false)
            .await
            .unwrap_err();

        match err {
            WgGenError::UnknownRegion { region, available } => {
                assert_eq!(region, "eu-central");
                assert_eq!(available.len(), UNKNOWN_REGION_SAMPLE);
                assert_eq!(available[0], "us-east (US-EAST)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_lowest_latency_wins() {
        let prober = ScriptedProber::new(&[
            ("10.0.0.1", 40),
            ("10.0.0.2", 25),
            ("10.0.0.3", 12),
            ("10.0.0.4", 60),
        ]);
        let chosen = selector(prober.clone())
            .select(&catalog(), None, false)
            .await
            .unwrap();
        assert_eq!(chosen.id, "ca-toronto");
        assert_eq!(prober.calls(), 4);
    }

    #[tokio::test]
    async fn test_tie_goes_to_catalog_order() {
        let prober = ScriptedProber::new(&[
            ("10.0.0.1", 30),
            ("10.0.0.2", 10),
            ("10.0.0.3", 10),
            ("10.0.0.4", 10),
        ]);
        for _ in 0..5 {
            let chosen = selector(prober.clone())
                .select(&catalog(), None, false)
                .await
                .unwrap();
            assert_eq!(chosen.id, "us-west");
        }
    }

    #[tokio::test]
    async fn test_port_forward_filter_applies_before_probing() {
        let catalog = Catalog {
            regions: vec![
                region("us-east", false, "10.0.0.1"),
                region("us-west", true, "10.0.0.2"),
            ],
        };
        let prober = ScriptedProber::new(&[("10.0.0.1", 8), ("10.0.0.2", 30)]);
        let chosen = selector(prober.clone())
            .select(&catalog, None, true)
            .await
            .unwrap();

        assert_eq!(chosen.id, "us-west");
        assert_eq!(prober.calls(), 1);
        let probed = prober.probed.lock().unwrap().clone();
        assert_eq!(probed, vec!["10.0.0.2".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_no_port_forward_regions() {
        let catalog = Catalog {
            regions: vec![region("us-east", false, "10.0.0.1")],
        };
        let prober = ScriptedProber::new(&[("10.0.0.1", 8)]);
        let err = selector(prober.clone())
            .select(&catalog, None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, WgGenError::NoSuitableRegion));
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let prober = ScriptedProber::new(&[]);
        let err = selector(prober)
            .select(&Catalog { regions: vec![] }, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, WgGenError::NoSuitableRegion));
    }

    #[tokio::test]
    async fn test_nothing_reachable() {
        let prober = ScriptedProber::new(&[]);
        let err = selector(prober.clone())
            .select(&catalog(), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, WgGenError::NoReachableRegion(_)));
        assert_eq!(prober.calls(), 4);
    }

    #[tokio::test]
    async fn test_regions_without_meta_are_skipped() {
        let mut catalog = catalog();
        catalog.regions[2].servers.meta.clear();
        let prober = ScriptedProber::new(&[("10.0.0.1", 40), ("10.0.0.3", 1), ("10.0.0.4", 20)]);
        let chosen = selector(prober.clone())
            .select(&catalog, None, false)
            .await
            .unwrap();
        assert_eq!(chosen.id, "uk-london");
        assert_eq!(prober.calls(), 3);
    }

    #[test]
    fn test_rank_is_total() {
        let result = |id: &str, ms: u64, position: usize| ProbeResult {
            region_id: id.into(),
            latency: Duration::from_millis(ms),
            position,
        };
        let mut results = vec![
            result("c", 20, 2),
            result("b", 10, 1),
            result("d", 10, 3),
            result("a", 30, 0),
        ];
        rank(&mut results);
        let order: Vec<_> = results.iter().map(|r| r.region_id.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "c", "a"]);
        assert!(results.windows(2).all(|w| w[0].latency <= w[1].latency));
    }
}
