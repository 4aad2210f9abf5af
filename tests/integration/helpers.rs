//! Fakes and fixtures shared by the integration tests

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netwatch::config::{Config, MonitorConfig};
use netwatch::discovery::{DiscoveryError, HostResolver, Neighbor, NeighborSource};
use netwatch::monitors::{CounterSample, Probe, ProbeError};
use netwatch::storage::{
    CleanupStats, DeviceRow, FlushBatch, HourlyAggregate, MonitorStore, QualityTest,
    QualityTestRow, SessionSummary, SnapshotRow, StorageError, StorageResult, TimeWindow,
};
use netwatch::{Device, NetworkSnapshot};

pub fn ip(last_octet: u8) -> IpAddr {
    IpAddr::from([192, 168, 1, last_octet])
}

pub fn neighbor(last_octet: u8) -> Neighbor {
    Neighbor {
        ip: ip(last_octet),
        mac: Some(format!("AA:BB:CC:00:00:{last_octet:02X}").parse().unwrap()),
        hostname: None,
    }
}

/// One-second ticks, one echo per probe, no sweep and no retention cleanup.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.monitor = MonitorConfig {
        tick_interval: Duration::from_secs(1),
        flush_interval: Duration::from_secs(10),
        discovery_interval: Duration::from_secs(3600),
        probe_timeout: Duration::from_millis(100),
        probe_samples: 1,
        dormant_after_failures: 3,
        max_buffered_snapshots: 1000,
        interface: None,
    };
    config.discovery.sweep = false;
    config.database.retention_days = None;
    config
}

/// Probe with scripted reachability that logs every echo target.
pub struct ScriptedProbe {
    unreachable: Mutex<HashSet<IpAddr>>,
    echoes: Mutex<Vec<IpAddr>>,
    counter: AtomicU64,
    counters_fail: AtomicBool,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self {
            unreachable: Mutex::new(HashSet::new()),
            echoes: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
            counters_fail: AtomicBool::new(false),
        }
    }

    pub fn set_reachable(&self, ip: IpAddr, reachable: bool) {
        let mut unreachable = self.unreachable.lock().unwrap();
        if reachable {
            unreachable.remove(&ip);
        } else {
            unreachable.insert(ip);
        }
    }

    pub fn fail_counters(&self, fail: bool) {
        self.counters_fail.store(fail, Ordering::SeqCst);
    }

    /// Every address echoed so far, in order
    pub fn echoes(&self) -> Vec<IpAddr> {
        self.echoes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn sample_counters(&self) -> Result<CounterSample, ProbeError> {
        if self.counters_fail.load(Ordering::SeqCst) {
            return Err(ProbeError::NoInterface("eth0".to_string()));
        }
        let total = self.counter.fetch_add(131_072, Ordering::SeqCst) + 131_072;
        Ok(CounterSample::new(total, total * 2, vec!["eth0".to_string()]))
    }

    async fn echo(&self, ip: IpAddr, _timeout: Duration) -> Result<Option<Duration>, ProbeError> {
        self.echoes.lock().unwrap().push(ip);
        if self.unreachable.lock().unwrap().contains(&ip) {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(4)))
        }
    }
}

/// Neighbor table whose contents the test replaces at will.
pub struct ScriptedNeighbors {
    entries: Mutex<Vec<Neighbor>>,
}

impl ScriptedNeighbors {
    pub fn new(entries: Vec<Neighbor>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn set(&self, entries: Vec<Neighbor>) {
        *self.entries.lock().unwrap() = entries;
    }
}

#[async_trait]
impl NeighborSource for ScriptedNeighbors {
    async fn neighbors(&self) -> Result<Vec<Neighbor>, DiscoveryError> {
        Ok(self.entries.lock().unwrap().clone())
    }
}

/// Reverse lookups answered from a fixed table.
pub struct NamedHosts(HashMap<IpAddr, String>);

impl NamedHosts {
    pub fn new(names: &[(IpAddr, &str)]) -> Self {
        Self(
            names
                .iter()
                .map(|(ip, name)| (*ip, name.to_string()))
                .collect(),
        )
    }
}

#[async_trait]
impl HostResolver for NamedHosts {
    async fn reverse(&self, ip: IpAddr) -> Option<String> {
        self.0.get(&ip).cloned()
    }
}

#[derive(Default)]
struct Tables {
    sessions: Vec<SessionSummary>,
    devices: Vec<DeviceRow>,
    snapshots: Vec<SnapshotRow>,
    quality_tests: Vec<QualityTestRow>,
    batches: Vec<FlushBatch>,
}

/// In-memory [`MonitorStore`] with the same session and device rules as the
/// SQLite store. `fail_writes` makes every `write_batch` fail.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    stalled_failure: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The next `write_batch` hangs for `stall` and then fails like a
    /// locked database. Later writes behave normally.
    pub fn fail_next_write_after(&self, stall: Duration) {
        *self.stalled_failure.lock().unwrap() = Some(stall);
    }

    pub fn snapshots(&self) -> Vec<SnapshotRow> {
        self.tables.lock().unwrap().snapshots.clone()
    }

    pub fn quality_tests(&self) -> Vec<QualityTestRow> {
        self.tables.lock().unwrap().quality_tests.clone()
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.tables.lock().unwrap().sessions.clone()
    }

    /// Every batch that was committed, in order
    pub fn batches(&self) -> Vec<FlushBatch> {
        self.tables.lock().unwrap().batches.clone()
    }

    pub fn device(&self, ip: IpAddr) -> Option<DeviceRow> {
        let tables = self.tables.lock().unwrap();
        tables.devices.iter().find(|row| row.device.ip == ip).cloned()
    }
}

fn open_session_mut(tables: &mut Tables, session_id: i64) -> StorageResult<&mut SessionSummary> {
    tables
        .sessions
        .iter_mut()
        .find(|s| s.id == session_id && s.is_open())
        .ok_or(StorageError::SessionNotOpen(session_id))
}

fn push_snapshot(
    tables: &mut Tables,
    session_id: i64,
    snapshot: &NetworkSnapshot,
) -> StorageResult<i64> {
    open_session_mut(tables, session_id)?;
    if let Some(last) = tables
        .snapshots
        .iter()
        .filter(|row| row.session_id == session_id)
        .map(|row| row.snapshot.timestamp)
        .max()
    {
        if snapshot.timestamp < last {
            return Err(StorageError::OutOfOrderSnapshot {
                session_id,
                last,
                attempted: snapshot.timestamp,
            });
        }
    }

    let id = tables.snapshots.len() as i64 + 1;
    tables.snapshots.push(SnapshotRow {
        id,
        session_id,
        snapshot: snapshot.clone(),
    });
    Ok(id)
}

fn push_quality_test(
    tables: &mut Tables,
    device_id: i64,
    session_id: i64,
    test: &QualityTest,
) -> StorageResult<i64> {
    open_session_mut(tables, session_id)?;
    if !tables.devices.iter().any(|row| row.id == device_id) {
        return Err(StorageError::UnknownDevice(device_id));
    }

    let id = tables.quality_tests.len() as i64 + 1;
    tables.quality_tests.push(QualityTestRow {
        id,
        device_id,
        session_id,
        test: test.clone(),
    });
    Ok(id)
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn start_session(&self, note: Option<&str>) -> StorageResult<i64> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(open) = tables.sessions.iter().find(|s| s.is_open()) {
            return Err(StorageError::SessionAlreadyOpen(open.id));
        }

        let id = tables.sessions.len() as i64 + 1;
        tables.sessions.push(SessionSummary {
            id,
            start_time: Utc::now(),
            end_time: None,
            note: note.map(str::to_string),
            degraded: false,
            total_snapshots: 0,
            avg_device_count: None,
            avg_bandwidth_mbps: None,
            avg_latency_ms: None,
            avg_quality_score: None,
            first_snapshot: None,
            last_snapshot: None,
        });
        Ok(id)
    }

    async fn end_session(&self, session_id: i64) -> StorageResult<SessionSummary> {
        let mut tables = self.tables.lock().unwrap();
        let snapshots: Vec<NetworkSnapshot> = tables
            .snapshots
            .iter()
            .filter(|row| row.session_id == session_id)
            .map(|row| row.snapshot.clone())
            .collect();

        let session = open_session_mut(&mut tables, session_id)?;
        session.end_time = Some(Utc::now().max(session.start_time));
        session.total_snapshots = snapshots.len() as i64;
        session.first_snapshot = snapshots.first().map(|s| s.timestamp);
        session.last_snapshot = snapshots.last().map(|s| s.timestamp);
        if !snapshots.is_empty() {
            let n = snapshots.len() as f64;
            session.avg_device_count =
                Some(snapshots.iter().map(|s| s.active_devices as f64).sum::<f64>() / n);
            session.avg_bandwidth_mbps =
                Some(snapshots.iter().map(NetworkSnapshot::total_mbps).sum::<f64>() / n);
        }
        Ok(session.clone())
    }

    async fn open_session(&self) -> StorageResult<Option<i64>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.sessions.iter().find(|s| s.is_open()).map(|s| s.id))
    }

    async fn mark_session_degraded(&self, session_id: i64) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        match tables.sessions.iter_mut().find(|s| s.id == session_id) {
            Some(session) => {
                session.degraded = true;
                Ok(())
            }
            None => Err(StorageError::SessionNotOpen(session_id)),
        }
    }

    async fn upsert_device(&self, device: &Device) -> StorageResult<i64> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables
            .devices
            .iter_mut()
            .find(|row| row.device.key() == device.key())
        {
            row.device.last_seen = row.device.last_seen.max(device.last_seen);
            if device.hostname.is_some() {
                row.device.hostname = device.hostname.clone();
            }
            row.device.is_active = true;
            return Ok(row.id);
        }

        let id = tables.devices.len() as i64 + 1;
        tables.devices.push(DeviceRow {
            id,
            device: device.clone(),
        });
        Ok(id)
    }

    async fn set_device_active(&self, device_id: i64, active: bool) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .devices
            .iter_mut()
            .find(|row| row.id == device_id)
            .ok_or(StorageError::UnknownDevice(device_id))?;
        row.device.is_active = active;
        Ok(())
    }

    async fn append_snapshot(
        &self,
        session_id: i64,
        snapshot: &NetworkSnapshot,
    ) -> StorageResult<i64> {
        push_snapshot(&mut self.tables.lock().unwrap(), session_id, snapshot)
    }

    async fn append_quality_test(
        &self,
        device_id: i64,
        session_id: i64,
        test: &QualityTest,
    ) -> StorageResult<i64> {
        push_quality_test(&mut self.tables.lock().unwrap(), device_id, session_id, test)
    }

    async fn write_batch(&self, session_id: i64, batch: &FlushBatch) -> StorageResult<()> {
        let stall = self.stalled_failure.lock().unwrap().take();
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
            return Err(StorageError::QueryFailed("database is locked".to_string()));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::QueryFailed("disk I/O error".to_string()));
        }

        let mut tables = self.tables.lock().unwrap();

        // Apply to a scratch copy so a failure leaves nothing behind
        let mut scratch = Tables {
            sessions: tables.sessions.clone(),
            devices: tables.devices.clone(),
            snapshots: tables.snapshots.clone(),
            quality_tests: tables.quality_tests.clone(),
            batches: Vec::new(),
        };
        open_session_mut(&mut scratch, session_id)?;
        for snapshot in &batch.snapshots {
            push_snapshot(&mut scratch, session_id, snapshot)?;
        }
        for pending in &batch.quality_tests {
            push_quality_test(&mut scratch, pending.device_id, session_id, &pending.test)?;
        }
        for deactivation in &batch.deactivations {
            let row = scratch
                .devices
                .iter_mut()
                .find(|row| row.id == deactivation.device_id)
                .ok_or(StorageError::UnknownDevice(deactivation.device_id))?;
            if row.device.last_seen <= deactivation.at {
                row.device.is_active = false;
            }
        }

        tables.devices = scratch.devices;
        tables.snapshots = scratch.snapshots;
        tables.quality_tests = scratch.quality_tests;
        tables.batches.push(batch.clone());
        Ok(())
    }

    async fn query_hourly_aggregate(
        &self,
        _window: TimeWindow,
    ) -> StorageResult<Vec<HourlyAggregate>> {
        Ok(Vec::new())
    }

    async fn list_devices(&self, active_only: bool) -> StorageResult<Vec<DeviceRow>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .devices
            .iter()
            .filter(|row| !active_only || row.device.is_active)
            .cloned()
            .collect())
    }

    async fn recent_snapshots(&self, limit: usize) -> StorageResult<Vec<SnapshotRow>> {
        let tables = self.tables.lock().unwrap();
        let skip = tables.snapshots.len().saturating_sub(limit);
        Ok(tables.snapshots[skip..].to_vec())
    }

    async fn device_history(
        &self,
        device_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<QualityTestRow>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .quality_tests
            .iter()
            .filter(|row| row.device_id == device_id && row.test.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn session_summary(&self, session_id: i64) -> StorageResult<Option<SessionSummary>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.sessions.iter().find(|s| s.id == session_id).cloned())
    }

    async fn cleanup_before(&self, _before: DateTime<Utc>) -> StorageResult<CleanupStats> {
        Ok(CleanupStats::default())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
