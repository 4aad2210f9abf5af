//! Store trait definition
//!
//! `MonitorStore` is the persistence seam: the scheduler writes through it,
//! the insight engine reads through it. Implementations must serialize all
//! writes (single writer) and run each write in its own transaction.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::StorageResult;
use super::schema::{
    CleanupStats, DeviceRow, FlushBatch, HourlyAggregate, QualityTest, QualityTestRow,
    SessionSummary, SnapshotRow,
};
use crate::{Device, NetworkSnapshot};

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `hours` hours leading up to now
    pub fn last_hours(hours: u32) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::hours(hours as i64),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Durable store for sessions, devices, snapshots and quality tests.
///
/// ## Thread Safety
///
/// Implementations are shared between the scheduler's flush task, the
/// discovery task and session-close calls, so they must be `Send + Sync`
/// and serialize their write path internally.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Open a new session. Fails with `SessionAlreadyOpen` while another
    /// session has no end time.
    async fn start_session(&self, note: Option<&str>) -> StorageResult<i64>;

    /// Close an open session and compute its summary statistics.
    ///
    /// Fails with `SessionNotOpen` if the id is unknown or already closed;
    /// nothing is modified in that case.
    async fn end_session(&self, session_id: i64) -> StorageResult<SessionSummary>;

    /// Id of the currently open session, if any
    async fn open_session(&self) -> StorageResult<Option<i64>>;

    /// Flag a session whose writes were (partly) rolled back
    async fn mark_session_degraded(&self, session_id: i64) -> StorageResult<()>;

    /// Insert or refresh a device matched on its (mac, ip) identity.
    ///
    /// A match updates `last_seen`, fills in a hostname if one is known and
    /// reactivates the device.
    async fn upsert_device(&self, device: &Device) -> StorageResult<i64>;

    /// Flip the active flag of a device (dormancy / reactivation)
    async fn set_device_active(&self, device_id: i64, active: bool) -> StorageResult<()>;

    /// Append one snapshot. Timestamps must not go backwards within a session.
    async fn append_snapshot(
        &self,
        session_id: i64,
        snapshot: &NetworkSnapshot,
    ) -> StorageResult<i64>;

    /// Append one quality test for an existing device
    async fn append_quality_test(
        &self,
        device_id: i64,
        session_id: i64,
        test: &QualityTest,
    ) -> StorageResult<i64>;

    /// Apply a whole flush atomically: either every row lands or none does.
    async fn write_batch(&self, session_id: i64, batch: &FlushBatch) -> StorageResult<()>;

    /// Snapshots in `window` averaged per wall-clock hour, oldest first.
    /// Hours without snapshots are absent.
    async fn query_hourly_aggregate(&self, window: TimeWindow)
    -> StorageResult<Vec<HourlyAggregate>>;

    async fn list_devices(&self, active_only: bool) -> StorageResult<Vec<DeviceRow>>;

    /// The `limit` most recent snapshots, oldest first
    async fn recent_snapshots(&self, limit: usize) -> StorageResult<Vec<SnapshotRow>>;

    /// Quality tests of one device since `since`, oldest first
    async fn device_history(
        &self,
        device_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<QualityTestRow>>;

    async fn session_summary(&self, session_id: i64) -> StorageResult<Option<SessionSummary>>;

    /// Delete telemetry older than `before` and deactivate devices not seen
    /// since then. Sessions are kept.
    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<CleanupStats>;

    /// Close the store and release its connections
    async fn close(&self) -> StorageResult<()>;
}
