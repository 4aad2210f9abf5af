//! Data handed from the running monitor to its callers

use std::time::Duration;

use serde::Serialize;

use crate::storage::SessionSummary;

/// Runtime counters, readable at any time through the handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorStats {
    pub ticks: u64,
    pub probes: u64,
    pub probe_failures: u64,
    pub bandwidth_failures: u64,
    pub devices_gone_dormant: u64,

    pub discovery_passes: u64,

    pub flushes: u64,
    pub flush_failures: u64,
    /// Reset by the next successful flush
    pub consecutive_flush_failures: u32,
    /// Snapshots lost to the buffer bound or rejected batches
    pub snapshots_dropped: u64,
    /// Set once any flush of the session failed
    pub degraded: bool,

    // === filled in on read ===
    pub buffered_snapshots: usize,
    pub rotation_len: usize,
    pub known_devices: usize,
}

/// Final account returned by `MonitorHandle::shutdown`.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub session: SessionSummary,
    pub stats: MonitorStats,
    /// Snapshots still buffered after the final flush failed
    pub unflushed_snapshots: usize,
    pub uptime: Duration,
}
