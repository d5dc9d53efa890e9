//! Run configuration
//!
//! Everything is read from flags or, more commonly in containers, the
//! environment. `Cli` is the raw parse; `Settings` is the validated form the
//! pipeline consumes.

use crate::{
    auth::DEFAULT_TOKEN_URL, catalog::DEFAULT_SERVERLIST_URL, probe::DEFAULT_PROBE_CONCURRENCY,
    Result, WgGenError,
};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// Command line and environment options
#[derive(Clone, Parser)]
#[command(name = "wggen")]
#[command(version)]
#[command(about = "Generate a WireGuard config for the lowest-latency region", long_about = None)]
pub struct Cli {
    /// Account username
    #[arg(long, env = "PIA_USER")]
    pub user: String,

    /// Account password
    #[arg(long, env = "PIA_PASS", hide_env_values = true)]
    pub pass: String,

    /// Only consider regions with port forwarding
    #[arg(
        long = "port-forward",
        env = "PIA_PF",
        action = ArgAction::Set,
        default_value = "false",
        value_parser = parse_flag
    )]
    pub port_forward: bool,

    /// Probe timeout in seconds
    #[arg(long, env = "MAX_LATENCY", default_value = "0.05", value_parser = parse_seconds)]
    pub max_latency: Duration,

    /// Region id to use without probing, or `none`
    #[arg(long, env = "PREFERRED_REGION", default_value = "none")]
    pub preferred_region: String,

    /// Directory for wg0.conf and region-metadata.json
    #[arg(long, env = "OUTPUT_DIR", default_value = "/output")]
    pub output_dir: PathBuf,

    /// Server list URL
    #[arg(long, env = "SERVERLIST_URL", default_value = DEFAULT_SERVERLIST_URL)]
    pub serverlist_url: String,

    /// Token endpoint URL
    #[arg(long, env = "TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,

    /// Maximum probes in flight
    #[arg(long, env = "PROBE_CONCURRENCY", default_value_t = DEFAULT_PROBE_CONCURRENCY)]
    pub probe_concurrency: usize,
}

/// `true` in any case enables; anything else disables
fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid number of seconds {:?}: {}", value, e))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("latency must be a positive number of seconds, got {}", value));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| format!("latency {} is out of range: {}", value, e))
}

/// Validated run settings
#[derive(Clone)]
pub struct Settings {
    /// Account username
    pub username: String,
    /// Account password
    pub password: String,
    /// Require port forwarding
    pub port_forward: bool,
    /// Probe timeout
    pub max_latency: Duration,
    /// Region to pin, skipping probes
    pub preferred_region: Option<String>,
    /// Output directory
    pub output_dir: PathBuf,
    /// Server list URL
    pub serverlist_url: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Maximum probes in flight
    pub probe_concurrency: usize,
}

impl Cli {
    /// Validate into `Settings`
    pub fn into_settings(self) -> Result<Settings> {
        if self.user.trim().is_empty() || self.pass.is_empty() {
            return Err(WgGenError::Config("PIA_USER and PIA_PASS are required".into()));
        }
        if self.probe_concurrency == 0 {
            return Err(WgGenError::Config("PROBE_CONCURRENCY must be at least 1".into()));
        }

        let preferred = self.preferred_region.trim();
        let preferred_region = if preferred.is_empty() || preferred.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(preferred.to_string())
        };

        Ok(Settings {
            username: self.user,
            password: self.pass,
            port_forward: self.port_forward,
            max_latency: self.max_latency,
            preferred_region,
            output_dir: self.output_dir,
            serverlist_url: self.serverlist_url,
            token_url: self.token_url,
            probe_concurrency: self.probe_concurrency,
        })
    }
}

impl Settings {
    /// Log the effective settings, minus the password
    pub fn log_summary(&self) {
        tracing::info!("PIA_USER: {}", self.username);
        tracing::info!("Port Forwarding: {}", self.port_forward);
        tracing::info!("Max Latency: {}s", self.max_latency.as_secs_f64());
        tracing::info!(
            "Preferred Region: {}",
            self.preferred_region.as_deref().unwrap_or("none")
        );
        tracing::debug!("Output directory: {}", self.output_dir.display());
        tracing::debug!("Probe concurrency: {}", self.probe_concurrency);
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("port_forward", &self.port_forward)
            .field("max_latency", &self.max_latency)
            .field("preferred_region", &self.preferred_region)
            .field("output_dir", &self.output_dir)
            .field("serverlist_url", &self.serverlist_url)
            .field("token_url", &self.token_url)
            .field("probe_concurrency", &self.probe_concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["wggen", "--user", "p1234567", "--pass", "secret"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&[]).into_settings().unwrap();
        assert!(!settings.port_forward);
        assert_eq!(settings.max_latency, Duration::from_millis(50));
        assert_eq!(settings.preferred_region, None);
        assert_eq!(settings.output_dir, PathBuf::from("/output"));
        assert_eq!(settings.serverlist_url, DEFAULT_SERVERLIST_URL);
        assert_eq!(settings.probe_concurrency, 20);
    }

    #[test]
    fn test_port_forward_flag() {
        assert!(parse(&["--port-forward", "TRUE"]).port_forward);
        assert!(parse(&["--port-forward", "true"]).port_forward);
        assert!(!parse(&["--port-forward", "yes"]).port_forward);
    }

    #[test]
    fn test_preferred_region() {
        let pinned = parse(&["--preferred-region", "us_california"]).into_settings().unwrap();
        assert_eq!(pinned.preferred_region.as_deref(), Some("us_california"));

        let none = parse(&["--preferred-region", "none"]).into_settings().unwrap();
        assert_eq!(none.preferred_region, None);
    }

    #[test]
    fn test_max_latency() {
        let cli = parse(&["--max-latency", "0.25"]);
        assert_eq!(cli.max_latency, Duration::from_millis(250));

        let argv = ["wggen", "--user", "u", "--pass", "p", "--max-latency", "-1"];
        assert!(Cli::try_parse_from(argv).is_err());
        assert!(parse_seconds("abc").is_err());
        assert!(parse_seconds("inf").is_err());
    }

    #[test]
    fn test_huge_max_latency_is_rejected() {
        let argv = ["wggen", "--user", "u", "--pass", "p", "--max-latency", "1e300"];
        let err = Cli::try_parse_from(argv).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(parse_seconds("1e300").unwrap_err().contains("out of range"));
        assert_eq!(parse_seconds("86400").unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = parse(&["--probe-concurrency", "0"]).into_settings().unwrap_err();
        assert!(matches!(err, WgGenError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = parse(&[]).into_settings().unwrap();
        assert!(!format!("{:?}", settings).contains("secret"));
    }
}
