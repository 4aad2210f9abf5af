use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::trace;

/// Top-level configuration file layout. Every section is optional.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub insights: InsightConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Snapshots and quality tests older than this are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./netwatch.db")
}

fn default_retention_days() -> Option<u32> {
    Some(30)
}

/// Options recognised by the monitor scheduler.
///
/// Durations are given in (fractional) seconds in the config file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    /// Cadence of the sampling loop; one bandwidth sample and at most one
    /// device probe per tick.
    #[serde(default = "default_tick_interval", deserialize_with = "de_secs")]
    pub tick_interval: Duration,

    /// How often the snapshot accumulator is written to the database.
    #[serde(default = "default_flush_interval", deserialize_with = "de_secs")]
    pub flush_interval: Duration,

    /// How often the neighbor table / ping sweep is re-read.
    #[serde(default = "default_discovery_interval", deserialize_with = "de_secs")]
    pub discovery_interval: Duration,

    /// Upper bound for a single echo attempt.
    #[serde(default = "default_probe_timeout", deserialize_with = "de_secs")]
    pub probe_timeout: Duration,

    /// Echo attempts per quality probe.
    #[serde(default = "default_probe_samples")]
    pub probe_samples: u32,

    /// Consecutive failed probes after which a device goes dormant.
    #[serde(default = "default_dormant_after_failures")]
    pub dormant_after_failures: u32,

    /// Cap on snapshots held in memory while the database is unavailable.
    #[serde(default = "default_max_buffered_snapshots")]
    pub max_buffered_snapshots: usize,

    /// Only count byte counters of this interface (all non-loopback if unset).
    #[serde(default)]
    pub interface: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            flush_interval: default_flush_interval(),
            discovery_interval: default_discovery_interval(),
            probe_timeout: default_probe_timeout(),
            probe_samples: default_probe_samples(),
            dormant_after_failures: default_dormant_after_failures(),
            max_buffered_snapshots: default_max_buffered_snapshots(),
            interface: None,
        }
    }
}

impl MonitorConfig {
    /// Reject settings the scheduler cannot honour.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be greater than zero".to_string());
        }
        if self.flush_interval.is_zero() {
            return Err("flush_interval must be greater than zero".to_string());
        }
        if self.discovery_interval.is_zero() {
            return Err("discovery_interval must be greater than zero".to_string());
        }
        if self.probe_samples == 0 {
            return Err("probe_samples must be at least 1".to_string());
        }
        if self.dormant_after_failures == 0 {
            return Err("dormant_after_failures must be at least 1".to_string());
        }
        if self.max_buffered_snapshots == 0 {
            return Err("max_buffered_snapshots must be at least 1".to_string());
        }
        let fits = self
            .probe_budget()
            .is_some_and(|budget| budget < self.tick_interval);
        if !fits {
            return Err(format!(
                "probe_timeout ({:?}) x probe_samples ({}) must fit inside tick_interval ({:?})",
                self.probe_timeout, self.probe_samples, self.tick_interval
            ));
        }
        Ok(())
    }

    /// Worst-case wall time of one device probe, `None` on overflow.
    pub fn probe_budget(&self) -> Option<Duration> {
        self.probe_timeout.checked_mul(self.probe_samples)
    }
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_discovery_interval() -> Duration {
    Duration::from_secs(600)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_probe_samples() -> u32 {
    2
}

fn default_dormant_after_failures() -> u32 {
    3
}

fn default_max_buffered_snapshots() -> usize {
    10_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DiscoveryConfig {
    /// IPv4 subnet to ping-sweep, e.g. "192.168.1.0/24"
    #[serde(default)]
    pub subnet: Option<String>,

    /// Sweep the subnet in addition to reading the neighbor table
    #[serde(default = "default_sweep")]
    pub sweep: bool,

    /// Echo requests in flight during a sweep
    #[serde(default = "default_sweep_concurrency")]
    pub sweep_concurrency: usize,

    /// Reverse-resolve devices the neighbor table reports without a name
    #[serde(default = "default_resolve_hostnames")]
    pub resolve_hostnames: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            subnet: None,
            sweep: default_sweep(),
            sweep_concurrency: default_sweep_concurrency(),
            resolve_hostnames: default_resolve_hostnames(),
        }
    }
}

fn default_sweep() -> bool {
    true
}

fn default_sweep_concurrency() -> usize {
    64
}

fn default_resolve_hostnames() -> bool {
    true
}

/// Options recognised by the insight engine.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct InsightConfig {
    /// Below this many populated hourly buckets only `insufficient_data`
    /// is reported.
    #[serde(default = "default_min_insight_buckets")]
    pub min_insight_buckets: usize,

    /// Buckets above mean + factor * stddev are high, below mean - factor *
    /// stddev are low.
    #[serde(default = "default_threshold_factor")]
    pub threshold_factor: f64,

    /// Default look-back used by the binary.
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

impl InsightConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.threshold_factor.is_finite() || self.threshold_factor < 0.0 {
            return Err(format!(
                "threshold_factor must be a non-negative number, got {}",
                self.threshold_factor
            ));
        }
        if self.min_insight_buckets == 0 {
            return Err("min_insight_buckets must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            min_insight_buckets: default_min_insight_buckets(),
            threshold_factor: default_threshold_factor(),
            window_hours: default_window_hours(),
        }
    }
}

fn default_min_insight_buckets() -> usize {
    3
}

fn default_threshold_factor() -> f64 {
    0.5
}

fn default_window_hours() -> u32 {
    168
}

fn de_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
