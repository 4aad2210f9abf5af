//! A real monitor run against SQLite on disk, and insights read back from it

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{DateTime, TimeZone, Utc};
use netwatch::actors::MonitorService;
use netwatch::config::{Config, InsightConfig};
use netwatch::insights::{InsightEngine, InsightKind};
use netwatch::storage::{MonitorStore, SqliteStore, StorageError, TimeWindow};
use netwatch::{NetworkSnapshot, QualityRating};
use tempfile::TempDir;

use super::helpers::*;

fn fast_config() -> Config {
    let mut config = test_config();
    config.monitor.tick_interval = Duration::from_millis(50);
    config.monitor.flush_interval = Duration::from_millis(150);
    config.monitor.probe_timeout = Duration::from_millis(10);
    config
}

async fn open_store(dir: &TempDir) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open(dir.path().join("netwatch.db")).await.unwrap())
}

fn midnight() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap()
}

fn snapshot(timestamp: DateTime<Utc>, up: f64, down: f64, devices: u32) -> NetworkSnapshot {
    NetworkSnapshot {
        timestamp,
        upload_mbps: up,
        download_mbps: down,
        usage_mb: (up + down) * 7.5,
        active_devices: devices,
        avg_latency_ms: Some(12.0),
        packet_loss: Some(0.0),
        quality: QualityRating::Excellent,
        interfaces: vec!["eth0".to_string()],
        tested_device: Some(ip(10)),
    }
}

#[tokio::test]
async fn test_monitor_run_is_persisted() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let probe = Arc::new(ScriptedProbe::new());
    let neighbors = Arc::new(ScriptedNeighbors::new(vec![neighbor(10), neighbor(11)]));

    let handle = MonitorService::new(fast_config(), store.clone(), probe, neighbors)
        .with_note("integration run")
        .start()
        .await
        .unwrap();
    let session_id = handle.session_id();

    tokio::time::sleep(Duration::from_millis(400)).await;
    let report = handle.shutdown().await.unwrap();

    assert!(report.stats.ticks > 0);
    assert_eq!(report.unflushed_snapshots, 0);
    assert_eq!(report.session.total_snapshots, report.stats.ticks as i64);
    assert_eq!(report.session.note.as_deref(), Some("integration run"));
    assert!(report.session.avg_latency_ms.is_some());
    assert!(!report.session.degraded);

    let snapshots = store.recent_snapshots(1000).await.unwrap();
    assert_eq!(snapshots.len() as u64, report.stats.ticks);
    assert!(snapshots.iter().all(|row| row.session_id == session_id));

    let devices = store.list_devices(true).await.unwrap();
    assert_eq!(devices.len(), 2);
    let history = store
        .device_history(devices[0].id, Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();
    assert!(!history.is_empty());

    assert_eq!(store.open_session().await.unwrap(), None);
    assert_matches!(
        store.end_session(session_id).await,
        Err(StorageError::SessionNotOpen(_))
    );

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_data_survives_reopening_the_database() {
    let dir = TempDir::new().unwrap();

    let store = open_store(&dir).await;
    let session_id = store.start_session(None).await.unwrap();
    store
        .append_snapshot(session_id, &snapshot(midnight(), 1.0, 2.0, 3))
        .await
        .unwrap();
    store.end_session(session_id).await.unwrap();
    store.close().await.unwrap();

    let store = open_store(&dir).await;
    let summary = store.session_summary(session_id).await.unwrap().unwrap();
    assert_eq!(summary.total_snapshots, 1);
    assert_eq!(summary.avg_bandwidth_mbps, Some(3.0));
    assert_eq!(store.recent_snapshots(10).await.unwrap().len(), 1);
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_insights_from_a_day_of_history() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let session_id = store.start_session(Some("fixture")).await.unwrap();
    for hour in 0..24u32 {
        let at = midnight() + chrono::Duration::hours(hour as i64) + chrono::Duration::minutes(5);
        let snap = if hour == 20 {
            snapshot(at, 0.0, 55.9, 12)
        } else {
            snapshot(at, 0.0, 10.0 + hour as f64, 4)
        };
        store.append_snapshot(session_id, &snap).await.unwrap();
    }
    store.end_session(session_id).await.unwrap();

    let engine = InsightEngine::new(store.clone(), InsightConfig::default());
    let window = TimeWindow::new(midnight(), midnight() + chrono::Duration::days(1));
    let insights = engine.generate_insights(window).await.unwrap();

    let peak = insights
        .iter()
        .find(|i| i.kind == InsightKind::PeakHour)
        .unwrap();
    assert_eq!(peak.metric("peak_hour"), Some(20.0));
    assert!((peak.metric("peak_mbps").unwrap() - 55.9).abs() < 1e-9);
    assert_eq!(peak.data_points, 24);
    assert!(peak.confidence > 0.0 && peak.confidence <= 1.0);

    let pattern = insights
        .iter()
        .find(|i| i.kind == InsightKind::DevicePattern)
        .unwrap();
    assert_eq!(pattern.metric("hour"), Some(20.0));
    assert!(insights.iter().any(|i| i.kind == InsightKind::Congestion));

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_two_hours_of_history_is_not_enough() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let session_id = store.start_session(None).await.unwrap();
    for hour in 0..2 {
        let at = midnight() + chrono::Duration::hours(hour);
        store
            .append_snapshot(session_id, &snapshot(at, 1.0, 1.0, 2))
            .await
            .unwrap();
    }
    store.end_session(session_id).await.unwrap();

    let engine = InsightEngine::new(store.clone(), InsightConfig::default());
    let window = TimeWindow::new(midnight(), midnight() + chrono::Duration::days(1));
    let insights = engine.generate_insights(window).await.unwrap();

    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].kind, InsightKind::InsufficientData);
    assert_eq!(insights[0].confidence, 0.0);

    store.close().await.unwrap();
}
