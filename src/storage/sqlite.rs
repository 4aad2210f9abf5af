//! SQLite implementation of [`MonitorStore`]
//!
//! ## Features
//!
//! - **Embedded**: a single database file next to the binary
//! - **WAL mode**: readers (insights, status) never block the flusher
//! - **Foreign keys**: snapshots and quality tests must reference live rows
//! - **Migrations**: schema versioning with `sqlx::migrate!`
//!
//! ## Writes
//!
//! Every write path takes `write_lock` and runs inside one transaction, so
//! there is exactly one writer at a time and a failed write leaves no
//! partial rows behind. The transaction rolls back when dropped on an error
//! path.

use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::backend::{MonitorStore, TimeWindow};
use super::error::{StorageError, StorageResult};
use super::schema::{
    CleanupStats, Deactivation, DeviceRow, FlushBatch, HourlyAggregate, QualityTest, QualityTestRow,
    SessionSummary, SnapshotRow,
};
use crate::monitors::QualityResult;
use crate::util::{millis_to_timestamp, timestamp_to_millis};
use crate::{Device, MacAddr, NetworkSnapshot};

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// SQLite-backed store
pub struct SqliteStore {
    pool: SqlitePool,
    db_path: String,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) the database file and run migrations.
    ///
    /// Any failure here is fatal to startup: the monitor refuses to run
    /// without durable storage.
    #[instrument(skip_all)]
    pub async fn open(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("opening SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("SQLite store ready");

        Ok(Self {
            pool,
            db_path: db_path_str,
            write_lock: Mutex::new(()),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

// === row helpers, shared by the single-call and batch write paths ===

async fn require_open_session(conn: &mut SqliteConnection, session_id: i64) -> StorageResult<()> {
    let end_time: Option<Option<i64>> =
        sqlx::query_scalar("SELECT end_time FROM monitoring_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&mut *conn)
            .await?;

    match end_time {
        Some(None) => Ok(()),
        _ => Err(StorageError::SessionNotOpen(session_id)),
    }
}

async fn insert_snapshot(
    conn: &mut SqliteConnection,
    session_id: i64,
    snapshot: &NetworkSnapshot,
) -> StorageResult<i64> {
    let attempted = timestamp_to_millis(&snapshot.timestamp);

    let last: Option<i64> =
        sqlx::query_scalar("SELECT MAX(timestamp) FROM network_snapshots WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&mut *conn)
            .await?;

    if let Some(last) = last {
        if attempted < last {
            return Err(StorageError::OutOfOrderSnapshot {
                session_id,
                last: millis_to_timestamp(last),
                attempted: snapshot.timestamp,
            });
        }
    }

    let interfaces = serde_json::to_string(&snapshot.interfaces)?;

    let result = sqlx::query(
        r#"
        INSERT INTO network_snapshots (
            session_id, timestamp, upload_mbps, download_mbps, usage_mb,
            active_devices, avg_latency_ms, avg_packet_loss, overall_quality,
            active_interfaces, tested_device_ip
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session_id)
    .bind(attempted)
    .bind(snapshot.upload_mbps)
    .bind(snapshot.download_mbps)
    .bind(snapshot.usage_mb)
    .bind(snapshot.active_devices as i64)
    .bind(snapshot.avg_latency_ms)
    .bind(snapshot.packet_loss)
    .bind(snapshot.quality.to_string())
    .bind(interfaces)
    .bind(snapshot.tested_device.map(|ip| ip.to_string()))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn insert_quality_test(
    conn: &mut SqliteConnection,
    device_id: i64,
    session_id: i64,
    test: &QualityTest,
) -> StorageResult<i64> {
    let known: Option<i64> = sqlx::query_scalar("SELECT id FROM devices WHERE id = ?")
        .bind(device_id)
        .fetch_optional(&mut *conn)
        .await?;
    if known.is_none() {
        return Err(StorageError::UnknownDevice(device_id));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO device_quality_tests (
            device_id, session_id, timestamp, latency_ms, min_latency_ms,
            max_latency_ms, jitter_ms, packet_loss, status
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(device_id)
    .bind(session_id)
    .bind(timestamp_to_millis(&test.timestamp))
    .bind(test.result.latency_ms)
    .bind(test.result.min_latency_ms)
    .bind(test.result.max_latency_ms)
    .bind(test.result.jitter_ms)
    .bind(test.result.packet_loss)
    .bind(test.result.status.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn set_active(conn: &mut SqliteConnection, device_id: i64, active: bool) -> StorageResult<()> {
    let result = sqlx::query("UPDATE devices SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(device_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::UnknownDevice(device_id));
    }
    Ok(())
}

/// Deactivate unless the device was seen after `deactivation.at`.
async fn apply_deactivation(
    conn: &mut SqliteConnection,
    deactivation: &Deactivation,
) -> StorageResult<()> {
    let result =
        sqlx::query("UPDATE devices SET is_active = 0 WHERE id = ? AND last_seen <= ?")
            .bind(deactivation.device_id)
            .bind(timestamp_to_millis(&deactivation.at))
            .execute(&mut *conn)
            .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let known: Option<i64> = sqlx::query_scalar("SELECT id FROM devices WHERE id = ?")
        .bind(deactivation.device_id)
        .fetch_optional(&mut *conn)
        .await?;
    match known {
        Some(_) => {
            debug!("device #{} seen again, keeping it active", deactivation.device_id);
            Ok(())
        }
        None => Err(StorageError::UnknownDevice(deactivation.device_id)),
    }
}

async fn fetch_summary(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> StorageResult<Option<SessionSummary>> {
    let row = sqlx::query(
        r#"
        SELECT s.id, s.start_time, s.end_time, s.note, s.degraded, s.total_snapshots,
               s.avg_device_count, s.avg_bandwidth_mbps, s.avg_latency_ms, s.avg_quality_score,
               COUNT(ns.id) AS live_snapshots,
               MIN(ns.timestamp) AS first_snapshot,
               MAX(ns.timestamp) AS last_snapshot
        FROM monitoring_sessions s
        LEFT JOIN network_snapshots ns ON ns.session_id = s.id
        WHERE s.id = ?
        GROUP BY s.id
        "#,
    )
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| summary_from_row(&row)).transpose()
}

fn summary_from_row(row: &SqliteRow) -> StorageResult<SessionSummary> {
    let end_time: Option<i64> = row.try_get("end_time")?;
    // Open sessions have no stored total yet
    let total_snapshots: i64 = match end_time {
        Some(_) => row.try_get("total_snapshots")?,
        None => row.try_get("live_snapshots")?,
    };

    Ok(SessionSummary {
        id: row.try_get("id")?,
        start_time: millis_to_timestamp(row.try_get("start_time")?),
        end_time: end_time.map(millis_to_timestamp),
        note: row.try_get("note")?,
        degraded: row.try_get("degraded")?,
        total_snapshots,
        avg_device_count: row.try_get("avg_device_count")?,
        avg_bandwidth_mbps: row.try_get("avg_bandwidth_mbps")?,
        avg_latency_ms: row.try_get("avg_latency_ms")?,
        avg_quality_score: row.try_get("avg_quality_score")?,
        first_snapshot: row
            .try_get::<Option<i64>, _>("first_snapshot")?
            .map(millis_to_timestamp),
        last_snapshot: row
            .try_get::<Option<i64>, _>("last_snapshot")?
            .map(millis_to_timestamp),
    })
}

fn parse_ip(raw: &str) -> StorageResult<IpAddr> {
    raw.parse()
        .map_err(|e| StorageError::SerializationError(format!("invalid IP address {raw:?}: {e}")))
}

fn device_from_row(row: &SqliteRow) -> StorageResult<DeviceRow> {
    let mac = row
        .try_get::<Option<String>, _>("mac_address")?
        .map(|raw| raw.parse::<MacAddr>())
        .transpose()
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;

    Ok(DeviceRow {
        id: row.try_get("id")?,
        device: Device {
            mac,
            ip: parse_ip(row.try_get("ip_address")?)?,
            hostname: row.try_get("hostname")?,
            first_seen: millis_to_timestamp(row.try_get("first_seen")?),
            last_seen: millis_to_timestamp(row.try_get("last_seen")?),
            is_active: row.try_get("is_active")?,
        },
    })
}

fn snapshot_from_row(row: &SqliteRow) -> StorageResult<SnapshotRow> {
    let quality: String = row.try_get("overall_quality")?;
    let interfaces: String = row.try_get("active_interfaces")?;
    let tested_device = row
        .try_get::<Option<String>, _>("tested_device_ip")?
        .map(|raw| parse_ip(&raw))
        .transpose()?;

    Ok(SnapshotRow {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        snapshot: NetworkSnapshot {
            timestamp: millis_to_timestamp(row.try_get("timestamp")?),
            upload_mbps: row.try_get("upload_mbps")?,
            download_mbps: row.try_get("download_mbps")?,
            usage_mb: row.try_get("usage_mb")?,
            active_devices: row.try_get::<i64, _>("active_devices")?.max(0) as u32,
            avg_latency_ms: row.try_get("avg_latency_ms")?,
            packet_loss: row.try_get("avg_packet_loss")?,
            quality: quality.parse().map_err(StorageError::SerializationError)?,
            interfaces: serde_json::from_str(&interfaces)?,
            tested_device,
        },
    })
}

fn quality_test_from_row(row: &SqliteRow) -> StorageResult<QualityTestRow> {
    let status: String = row.try_get("status")?;

    Ok(QualityTestRow {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        session_id: row.try_get("session_id")?,
        test: QualityTest {
            timestamp: millis_to_timestamp(row.try_get("timestamp")?),
            result: QualityResult {
                latency_ms: row.try_get("latency_ms")?,
                min_latency_ms: row.try_get("min_latency_ms")?,
                max_latency_ms: row.try_get("max_latency_ms")?,
                jitter_ms: row.try_get("jitter_ms")?,
                packet_loss: row.try_get("packet_loss")?,
                status: status.parse().map_err(StorageError::SerializationError)?,
            },
        },
    })
}

#[async_trait]
impl MonitorStore for SqliteStore {
    #[instrument(skip(self))]
    async fn start_session(&self, note: Option<&str>) -> StorageResult<i64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let open: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM monitoring_sessions WHERE end_time IS NULL ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(open) = open {
            return Err(StorageError::SessionAlreadyOpen(open));
        }

        let result = sqlx::query("INSERT INTO monitoring_sessions (start_time, note) VALUES (?, ?)")
            .bind(timestamp_to_millis(&Utc::now()))
            .bind(note)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let session_id = result.last_insert_rowid();
        info!("started monitoring session #{}", session_id);
        Ok(session_id)
    }

    #[instrument(skip(self))]
    async fn end_session(&self, session_id: i64) -> StorageResult<SessionSummary> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        require_open_session(&mut *tx, session_id).await?;

        let (count, avg_devices, avg_bandwidth, avg_latency, avg_score): (
            i64,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
        ) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   AVG(active_devices),
                   AVG(upload_mbps + download_mbps),
                   AVG(avg_latency_ms),
                   AVG(CASE overall_quality
                           WHEN 'excellent' THEN 4.0
                           WHEN 'good' THEN 3.0
                           WHEN 'fair' THEN 2.0
                           WHEN 'poor' THEN 1.0
                           ELSE NULL
                       END)
            FROM network_snapshots
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE monitoring_sessions
            SET end_time = MAX(start_time, ?),
                total_snapshots = ?,
                avg_device_count = ?,
                avg_bandwidth_mbps = ?,
                avg_latency_ms = ?,
                avg_quality_score = ?
            WHERE id = ?
            "#,
        )
        .bind(timestamp_to_millis(&Utc::now()))
        .bind(count)
        .bind(avg_devices)
        .bind(avg_bandwidth)
        .bind(avg_latency)
        .bind(avg_score)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        let summary = fetch_summary(&mut *tx, session_id)
            .await?
            .ok_or(StorageError::SessionNotOpen(session_id))?;

        tx.commit().await?;

        info!(
            "closed monitoring session #{} with {} snapshots",
            session_id, summary.total_snapshots
        );
        Ok(summary)
    }

    async fn open_session(&self) -> StorageResult<Option<i64>> {
        let open = sqlx::query_scalar(
            "SELECT id FROM monitoring_sessions WHERE end_time IS NULL ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(open)
    }

    #[instrument(skip(self))]
    async fn mark_session_degraded(&self, session_id: i64) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("UPDATE monitoring_sessions SET degraded = 1 WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotOpen(session_id));
        }
        warn!("session #{} marked degraded", session_id);
        Ok(())
    }

    #[instrument(skip(self, device), fields(device = %device.key()))]
    async fn upsert_device(&self, device: &Device) -> StorageResult<i64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let ip = device.ip.to_string();
        let mac = device.mac.map(|mac| mac.to_string());
        let last_seen = timestamp_to_millis(&device.last_seen.max(device.first_seen));

        // `IS` so that an unresolved MAC matches an unresolved MAC
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM devices WHERE ip_address = ? AND mac_address IS ?")
                .bind(&ip)
                .bind(&mac)
                .fetch_optional(&mut *tx)
                .await?;

        let device_id = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE devices
                    SET last_seen = MAX(last_seen, ?),
                        hostname = COALESCE(?, hostname),
                        is_active = 1
                    WHERE id = ?
                    "#,
                )
                .bind(last_seen)
                .bind(&device.hostname)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO devices (mac_address, ip_address, hostname, first_seen, last_seen, is_active)
                    VALUES (?, ?, ?, ?, ?, 1)
                    "#,
                )
                .bind(&mac)
                .bind(&ip)
                .bind(&device.hostname)
                .bind(timestamp_to_millis(&device.first_seen))
                .bind(last_seen)
                .execute(&mut *tx)
                .await?;
                debug!("inserted new device");
                result.last_insert_rowid()
            }
        };

        tx.commit().await?;
        Ok(device_id)
    }

    #[instrument(skip(self))]
    async fn set_device_active(&self, device_id: i64, active: bool) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        set_active(&mut *conn, device_id, active).await
    }

    #[instrument(skip(self, snapshot), fields(at = %snapshot.timestamp))]
    async fn append_snapshot(
        &self,
        session_id: i64,
        snapshot: &NetworkSnapshot,
    ) -> StorageResult<i64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        require_open_session(&mut *tx, session_id).await?;
        let id = insert_snapshot(&mut *tx, session_id, snapshot).await?;

        tx.commit().await?;
        Ok(id)
    }

    #[instrument(skip(self, test))]
    async fn append_quality_test(
        &self,
        device_id: i64,
        session_id: i64,
        test: &QualityTest,
    ) -> StorageResult<i64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        require_open_session(&mut *tx, session_id).await?;
        let id = insert_quality_test(&mut *tx, device_id, session_id, test).await?;

        tx.commit().await?;
        Ok(id)
    }

    #[instrument(
        skip(self, batch),
        fields(
            snapshots = batch.snapshots.len(),
            tests = batch.quality_tests.len(),
            deactivated = batch.deactivations.len()
        )
    )]
    async fn write_batch(&self, session_id: i64, batch: &FlushBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        require_open_session(&mut *tx, session_id).await?;

        for snapshot in &batch.snapshots {
            insert_snapshot(&mut *tx, session_id, snapshot).await?;
        }
        for pending in &batch.quality_tests {
            insert_quality_test(&mut *tx, pending.device_id, session_id, &pending.test).await?;
        }
        for deactivation in &batch.deactivations {
            apply_deactivation(&mut *tx, deactivation).await?;
        }

        tx.commit().await?;

        debug!("batch committed");
        Ok(())
    }

    #[instrument(skip(self), fields(start = %window.start, end = %window.end))]
    async fn query_hourly_aggregate(
        &self,
        window: TimeWindow,
    ) -> StorageResult<Vec<HourlyAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp / ? AS hour_bucket,
                   AVG(upload_mbps + download_mbps) AS mean_bandwidth,
                   AVG(active_devices) AS mean_devices,
                   AVG(avg_latency_ms) AS mean_latency,
                   COUNT(*) AS sample_count
            FROM network_snapshots
            WHERE timestamp >= ? AND timestamp < ?
            GROUP BY hour_bucket
            ORDER BY hour_bucket ASC
            "#,
        )
        .bind(MILLIS_PER_HOUR)
        .bind(timestamp_to_millis(&window.start))
        .bind(timestamp_to_millis(&window.end))
        .fetch_all(&self.pool)
        .await?;

        let aggregates = rows
            .iter()
            .map(|row| {
                let bucket: i64 = row.try_get("hour_bucket")?;
                Ok(HourlyAggregate {
                    hour_start: millis_to_timestamp(bucket * MILLIS_PER_HOUR),
                    mean_bandwidth_mbps: row.try_get("mean_bandwidth")?,
                    mean_active_devices: row.try_get("mean_devices")?,
                    mean_latency_ms: row.try_get("mean_latency")?,
                    sample_count: row.try_get("sample_count")?,
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        debug!("aggregated {} hours", aggregates.len());
        Ok(aggregates)
    }

    async fn list_devices(&self, active_only: bool) -> StorageResult<Vec<DeviceRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, mac_address, ip_address, hostname, first_seen, last_seen, is_active
            FROM devices
            WHERE ? = 0 OR is_active = 1
            ORDER BY id ASC
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(device_from_row).collect()
    }

    async fn recent_snapshots(&self, limit: usize) -> StorageResult<Vec<SnapshotRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, timestamp, upload_mbps, download_mbps, usage_mb,
                   active_devices, avg_latency_ms, avg_packet_loss, overall_quality,
                   active_interfaces, tested_device_ip
            FROM network_snapshots
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut snapshots = rows
            .iter()
            .map(snapshot_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        // Oldest first
        snapshots.reverse();
        Ok(snapshots)
    }

    async fn device_history(
        &self,
        device_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<QualityTestRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, device_id, session_id, timestamp, latency_ms, min_latency_ms,
                   max_latency_ms, jitter_ms, packet_loss, status
            FROM device_quality_tests
            WHERE device_id = ? AND timestamp >= ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(device_id)
        .bind(timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(quality_test_from_row).collect()
    }

    async fn session_summary(&self, session_id: i64) -> StorageResult<Option<SessionSummary>> {
        let mut conn = self.pool.acquire().await?;
        fetch_summary(&mut *conn, session_id).await
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<CleanupStats> {
        let before_millis = timestamp_to_millis(&before);

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let quality_tests = sqlx::query("DELETE FROM device_quality_tests WHERE timestamp < ?")
            .bind(before_millis)
            .execute(&mut *tx)
            .await?;
        let snapshots = sqlx::query("DELETE FROM network_snapshots WHERE timestamp < ?")
            .bind(before_millis)
            .execute(&mut *tx)
            .await?;
        let devices =
            sqlx::query("UPDATE devices SET is_active = 0 WHERE is_active = 1 AND last_seen < ?")
                .bind(before_millis)
                .execute(&mut *tx)
                .await?;

        tx.commit().await?;

        let stats = CleanupStats {
            snapshots_deleted: snapshots.rows_affected(),
            quality_tests_deleted: quality_tests.rows_affected(),
            devices_deactivated: devices.rows_affected(),
        };
        info!(
            "retention cleanup removed {} snapshots and {} quality tests",
            stats.snapshots_deleted, stats.quality_tests_deleted
        );
        Ok(stats)
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
