//! Concurrent readers, flushes and ticks on a multi-threaded runtime
//!
//! These run in real time with short intervals so the scheduler, the
//! flusher, forced flushes and a display reader genuinely interleave.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use netwatch::actors::MonitorService;
use netwatch::config::Config;

use super::helpers::*;

fn fast_config() -> Config {
    let mut config = test_config();
    config.monitor.tick_interval = Duration::from_millis(20);
    config.monitor.flush_interval = Duration::from_millis(50);
    config.monitor.probe_timeout = Duration::from_millis(5);
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_flush_and_display_never_see_half_a_tick() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(ScriptedProbe::new());
    probe.set_reachable(ip(12), false);
    let neighbors = Arc::new(ScriptedNeighbors::new(vec![
        neighbor(10),
        neighbor(11),
        neighbor(12),
    ]));

    let handle = MonitorService::new(fast_config(), store.clone(), probe, neighbors)
        .start()
        .await
        .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let torn_reads = Arc::new(AtomicUsize::new(0));

    let display = {
        let reader = handle.reader();
        let stop = stop.clone();
        let torn_reads = torn_reads.clone();
        tokio::spawn(async move {
            while !stop.load(Ordering::SeqCst) {
                if let Some(snapshot) = reader.current_snapshot().await {
                    // the probe fields of a snapshot are set together or not at all
                    if snapshot.tested_device.is_some() != snapshot.packet_loss.is_some() {
                        torn_reads.fetch_add(1, Ordering::SeqCst);
                    }
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..40 {
        handle.flush_now().await;
        tokio::time::sleep(Duration::from_millis(7)).await;
    }

    stop.store(true, Ordering::SeqCst);
    display.await.unwrap();
    let report = handle.shutdown().await.unwrap();

    assert_eq!(torn_reads.load(Ordering::SeqCst), 0);
    assert!(report.stats.ticks > 0);
    assert_eq!(report.session.total_snapshots, report.stats.ticks as i64);
    assert_eq!(store.snapshots().len() as u64, report.stats.ticks);

    // every committed batch carries each tick whole: one quality test per
    // probed snapshot, with the snapshot's timestamp
    for batch in store.batches() {
        let probed: HashSet<_> = batch
            .snapshots
            .iter()
            .filter(|s| s.tested_device.is_some())
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(batch.quality_tests.len(), probed.len());
        assert!(
            batch
                .quality_tests
                .iter()
                .all(|pending| probed.contains(&pending.test.timestamp))
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_readers_see_consistent_stats() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(ScriptedProbe::new());
    let neighbors = Arc::new(ScriptedNeighbors::new(vec![neighbor(10), neighbor(11)]));

    let handle = MonitorService::new(fast_config(), store, probe, neighbors)
        .start()
        .await
        .unwrap();

    let mut readers = Vec::new();
    for _ in 0..8 {
        let reader = handle.reader();
        readers.push(tokio::spawn(async move {
            let mut last_ticks = 0;
            for _ in 0..50 {
                let stats = reader.stats().await;
                assert!(stats.ticks >= last_ticks);
                assert!(stats.probes <= stats.ticks);
                assert_eq!(stats.known_devices, 2);
                last_ticks = stats.ticks;
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }));
    }

    for reader in readers {
        reader.await.unwrap();
    }
    handle.shutdown().await.unwrap();
}
