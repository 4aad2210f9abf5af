//! Scheduler behaviour under paused time
//!
//! Ticks are one second apart and the fakes answer immediately, so sleeping
//! `n.5` seconds lets exactly `n + 1` ticks (at 0, 1, ..., n) run.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use netwatch::QualityRating;
use netwatch::actors::{MonitorError, MonitorHandle, MonitorService};
use netwatch::config::Config;
use netwatch::discovery::Neighbor;
use netwatch::storage::MonitorStore;
use pretty_assertions::assert_eq;
use tokio::time::sleep;

use super::helpers::*;

struct Fakes {
    store: Arc<MemoryStore>,
    probe: Arc<ScriptedProbe>,
    neighbors: Arc<ScriptedNeighbors>,
}

impl Fakes {
    fn new(entries: Vec<Neighbor>) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            probe: Arc::new(ScriptedProbe::new()),
            neighbors: Arc::new(ScriptedNeighbors::new(entries)),
        }
    }

    fn service(&self, config: Config) -> MonitorService {
        MonitorService::new(
            config,
            self.store.clone(),
            self.probe.clone(),
            self.neighbors.clone(),
        )
    }

    async fn start(&self, config: Config) -> MonitorHandle {
        self.service(config).start().await.unwrap()
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[tokio::test(start_paused = true)]
async fn test_round_robin_visits_each_device_once_per_rotation() {
    let fakes = Fakes::new(vec![neighbor(10), neighbor(11), neighbor(12)]);
    let handle = fakes.start(test_config()).await;

    sleep(secs(5.5)).await;

    assert_eq!(
        fakes.probe.echoes(),
        vec![ip(10), ip(11), ip(12), ip(10), ip(11), ip(12)]
    );
    let stats = handle.stats().await;
    assert_eq!(stats.ticks, 6);
    assert_eq!(stats.probes, 6);
    assert_eq!(stats.rotation_len, 3);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_device_found_mid_rotation_waits_for_the_rotation_to_finish() {
    let mut config = test_config();
    config.monitor.discovery_interval = secs(1.5);

    let fakes = Fakes::new(vec![neighbor(10), neighbor(11), neighbor(12)]);
    let handle = fakes.start(config).await;

    // Lower address than everyone else, still joins at the tail
    fakes
        .neighbors
        .set(vec![neighbor(5), neighbor(10), neighbor(11), neighbor(12)]);

    sleep(secs(5.5)).await;

    // ticks 0 and 1 probe .10 and .11, the pass at 1.5s adds .5
    assert_eq!(
        fakes.probe.echoes(),
        vec![ip(10), ip(11), ip(12), ip(5), ip(10), ip(11)]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_device_goes_dormant_and_returns_on_rediscovery() {
    let mut config = test_config();
    config.monitor.flush_interval = secs(4.0);
    config.monitor.discovery_interval = secs(10.0);

    let fakes = Fakes::new(vec![neighbor(10), neighbor(11)]);
    fakes.probe.set_reachable(ip(11), false);
    let handle = fakes.start(config).await;

    sleep(secs(8.5)).await;

    assert_eq!(
        fakes.probe.echoes(),
        vec![
            ip(10),
            ip(11),
            ip(10),
            ip(11),
            ip(10),
            ip(11),
            ip(10),
            ip(10),
            ip(10)
        ]
    );

    let stats = handle.stats().await;
    assert_eq!(stats.probe_failures, 3);
    assert_eq!(stats.devices_gone_dormant, 1);
    assert_eq!(stats.rotation_len, 1);
    assert_eq!(stats.known_devices, 2);

    let reader = handle.reader();
    let dormant = reader
        .devices()
        .await
        .into_iter()
        .find(|d| d.device.ip == ip(11))
        .unwrap();
    assert!(!dormant.device.is_active);

    // the deactivation was flushed at 8s
    assert!(!fakes.store.device(ip(11)).unwrap().device.is_active);

    // the next discovery pass at 10s brings it back at the tail
    fakes.probe.set_reachable(ip(11), true);
    sleep(secs(2.0)).await;

    assert!(fakes.store.device(ip(11)).unwrap().device.is_active);
    let order = reader.rotation_order().await;
    assert_eq!(order.len(), 2);
    assert!(order.iter().any(|key| key.ip == ip(11)));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_current_snapshot_reflects_last_tick() {
    let fakes = Fakes::new(vec![neighbor(10), neighbor(11), neighbor(12)]);
    let handle = fakes.start(test_config()).await;

    sleep(secs(1.5)).await;

    let snapshot = handle.current_snapshot().await.unwrap();
    assert_eq!(snapshot.active_devices, 3);
    assert_eq!(snapshot.tested_device, Some(ip(11)));
    assert_eq!(snapshot.avg_latency_ms, Some(4.0));
    assert_eq!(snapshot.packet_loss, Some(0.0));
    assert_eq!(snapshot.quality, QualityRating::Excellent);
    // 128 KiB up and 256 KiB down per one-second tick
    assert_eq!(snapshot.upload_mbps, 1.0);
    assert_eq!(snapshot.download_mbps, 2.0);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_flush_degrades_session_and_keeps_data() {
    let mut config = test_config();
    config.monitor.flush_interval = secs(2.0);

    let fakes = Fakes::new(vec![neighbor(10)]);
    fakes.store.fail_writes(true);
    let handle = fakes.start(config).await;

    sleep(secs(2.5)).await;

    let stats = handle.stats().await;
    assert_eq!(stats.flush_failures, 1);
    assert_eq!(stats.consecutive_flush_failures, 1);
    assert!(stats.degraded);
    assert_eq!(stats.buffered_snapshots, 3);
    assert!(fakes.store.sessions()[0].degraded);
    assert!(fakes.store.snapshots().is_empty());

    fakes.store.fail_writes(false);
    sleep(secs(2.0)).await;

    let stats = handle.stats().await;
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.consecutive_flush_failures, 0);
    assert!(stats.degraded);

    let report = handle.shutdown().await.unwrap();
    assert!(report.session.degraded);
    assert_eq!(report.unflushed_snapshots, 0);
    assert_eq!(report.session.total_snapshots, report.stats.ticks as i64);

    // requeued snapshots went in ahead of the newer ones
    let times: Vec<_> = fakes
        .store
        .snapshots()
        .iter()
        .map(|row| row.snapshot.timestamp)
        .collect();
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test(start_paused = true)]
async fn test_flush_now_waits_for_a_slow_failing_flush() {
    let mut config = test_config();
    config.monitor.flush_interval = secs(4.0);

    let fakes = Fakes::new(vec![neighbor(10)]);
    // the periodic flush at 4s hangs until 7s and then fails
    fakes.store.fail_next_write_after(secs(3.0));
    let handle = fakes.start(config).await;

    sleep(secs(5.5)).await;
    assert!(handle.flush_now().await);

    let stats = handle.stats().await;
    assert_eq!(stats.flush_failures, 1);
    assert_eq!(stats.flushes, 1);

    let report = handle.shutdown().await.unwrap();
    assert!(report.session.degraded);
    assert_eq!(report.stats.snapshots_dropped, 0);
    assert_eq!(report.unflushed_snapshots, 0);
    assert_eq!(report.session.total_snapshots, report.stats.ticks as i64);

    let times: Vec<_> = fakes
        .store
        .snapshots()
        .iter()
        .map(|row| row.snapshot.timestamp)
        .collect();
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_and_closes_the_session() {
    let fakes = Fakes::new(vec![neighbor(10), neighbor(11)]);
    let handle = fakes.start(test_config()).await;
    let session_id = handle.session_id();

    sleep(secs(2.5)).await;
    let report = handle.shutdown().await.unwrap();

    assert_eq!(report.session.id, session_id);
    assert!(!report.session.is_open());
    assert_eq!(report.stats.ticks, 3);
    assert_eq!(report.session.total_snapshots, 3);
    assert_eq!(report.unflushed_snapshots, 0);
    assert_eq!(fakes.store.quality_tests().len(), 3);
    assert_eq!(fakes.store.open_session().await.unwrap(), None);

    // nothing runs after shutdown
    let echoes = fakes.probe.echoes().len();
    sleep(secs(5.0)).await;
    assert_eq!(fakes.probe.echoes().len(), echoes);
}

#[tokio::test(start_paused = true)]
async fn test_start_closes_a_stale_session() {
    let fakes = Fakes::new(vec![neighbor(10)]);
    let stale = fakes.store.start_session(Some("crashed run")).await.unwrap();

    let handle = fakes.service(test_config()).with_note("fresh").start().await.unwrap();

    let sessions = fakes.store.sessions();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, stale);
    assert!(!sessions[0].is_open());
    assert_eq!(sessions[1].note.as_deref(), Some("fresh"));
    assert_eq!(handle.session_id(), sessions[1].id);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unnamed_devices_get_their_reverse_name() {
    let fakes = Fakes::new(vec![neighbor(10), neighbor(11)]);
    let handle = fakes
        .service(test_config())
        .with_resolver(Arc::new(NamedHosts::new(&[(ip(10), "nas.lan")])))
        .start()
        .await
        .unwrap();

    let stored = fakes.store.device(ip(10)).unwrap();
    assert_eq!(stored.device.hostname.as_deref(), Some("nas.lan"));
    assert_eq!(fakes.store.device(ip(11)).unwrap().device.hostname, None);

    let tracked = handle.reader().devices().await;
    assert_eq!(tracked[0].device.hostname.as_deref(), Some("nas.lan"));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_usable_interface_is_fatal() {
    let fakes = Fakes::new(vec![neighbor(10)]);
    fakes.probe.fail_counters(true);

    let Err(e) = fakes.service(test_config()).start().await else {
        panic!("monitor started without a usable interface");
    };

    assert_matches!(e, MonitorError::NoUsableInterface(_));
    assert!(fakes.store.sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_configuration_is_rejected() {
    let fakes = Fakes::new(vec![]);

    let mut zero_tick = test_config();
    zero_tick.monitor.tick_interval = Duration::ZERO;

    let mut bad_subnet = test_config();
    bad_subnet.discovery.subnet = Some("192.168.1.0/33".to_string());

    let mut negative_factor = test_config();
    negative_factor.insights.threshold_factor = -0.5;

    for config in [zero_tick, bad_subnet, negative_factor] {
        let Err(e) = fakes.service(config).start().await else {
            panic!("monitor started with an invalid configuration");
        };
        assert_matches!(e, MonitorError::Config(_));
    }

    assert!(fakes.store.sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bandwidth_failure_still_records_a_snapshot() {
    let fakes = Fakes::new(vec![neighbor(10)]);
    let handle = fakes.start(test_config()).await;

    fakes.probe.fail_counters(true);
    sleep(secs(1.5)).await;

    let stats = handle.stats().await;
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.bandwidth_failures, 2);

    let snapshot = handle.current_snapshot().await.unwrap();
    assert_eq!(snapshot.upload_mbps, 0.0);
    assert!(snapshot.interfaces.is_empty());
    assert_eq!(snapshot.tested_device, Some(ip(10)));

    handle.shutdown().await.unwrap();
}
