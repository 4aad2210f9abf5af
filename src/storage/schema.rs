//! Row types for the four persisted tables and the derived aggregates
//!
//! ## Layout
//!
//! - `devices` - one row per (mac, ip) identity, never deleted
//! - `monitoring_sessions` - lifecycle + summary computed at close
//! - `network_snapshots` - append-only, `(session_id, timestamp)` indexed
//! - `device_quality_tests` - append-only, `(device_id, timestamp)` indexed
//!
//! Timestamps are stored as Unix milliseconds so range predicates stay
//! integer comparisons on the indexed columns.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::monitors::QualityResult;
use crate::{Device, NetworkSnapshot};

/// A device together with its row id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRow {
    pub id: i64,

    #[serde(flatten)]
    pub device: Device,
}

/// A persisted snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: i64,
    pub session_id: i64,

    #[serde(flatten)]
    pub snapshot: NetworkSnapshot,
}

/// One quality probe result as handed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTest {
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub result: QualityResult,
}

/// A quality test waiting in the accumulator for the next flush
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQualityTest {
    pub device_id: i64,
    pub test: QualityTest,
}

/// A persisted quality test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTestRow {
    pub id: i64,
    pub device_id: i64,
    pub session_id: i64,

    #[serde(flatten)]
    pub test: QualityTest,
}

/// A device that went dormant at `at`.
///
/// Applied only if the device has not been seen since, so a rediscovery
/// that races the flush wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deactivation {
    pub device_id: i64,
    pub at: DateTime<Utc>,
}

/// Everything a single flush writes, applied in one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushBatch {
    pub snapshots: Vec<NetworkSnapshot>,
    pub quality_tests: Vec<PendingQualityTest>,
    /// Devices that went dormant since the previous flush
    pub deactivations: Vec<Deactivation>,
}

impl FlushBatch {
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
            && self.quality_tests.is_empty()
            && self.deactivations.is_empty()
    }
}

/// Session row plus its snapshot range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    /// `None` while the session is open
    pub end_time: Option<DateTime<Utc>>,
    pub note: Option<String>,
    /// Set when at least one flush of this session was rolled back
    pub degraded: bool,
    pub total_snapshots: i64,

    // === computed at close ===
    pub avg_device_count: Option<f64>,
    pub avg_bandwidth_mbps: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub avg_quality_score: Option<f64>,

    pub first_snapshot: Option<DateTime<Utc>>,
    pub last_snapshot: Option<DateTime<Utc>>,
}

impl SessionSummary {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Snapshots of one wall-clock hour, averaged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    /// Start of the hour (UTC)
    pub hour_start: DateTime<Utc>,
    /// Mean of upload + download across the hour's snapshots
    pub mean_bandwidth_mbps: f64,
    pub mean_active_devices: f64,
    /// Mean latency of the snapshots that carried a successful probe
    pub mean_latency_ms: Option<f64>,
    pub sample_count: i64,
}

impl HourlyAggregate {
    /// Hour of day (0-23, UTC)
    pub fn hour_of_day(&self) -> u32 {
        self.hour_start.hour()
    }

    pub fn hour_end(&self) -> DateTime<Utc> {
        self.hour_start + Duration::hours(1)
    }
}

/// Rows touched by a retention cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub snapshots_deleted: u64,
    pub quality_tests_deleted: u64,
    pub devices_deactivated: u64,
}
