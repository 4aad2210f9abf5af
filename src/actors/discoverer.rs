use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, instrument, warn};

use super::registry::MergeOutcome;
use super::service::Shared;
use crate::Device;
use crate::discovery::{DeviceDiscovery, Neighbor};

/// Re-runs discovery every `discovery_interval` and merges the result into
/// the registry.
pub struct DiscoveryActor {
    shared: Arc<Shared>,
    discovery: DeviceDiscovery,
    cancel_rx: watch::Receiver<bool>,
}

impl DiscoveryActor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        discovery: DeviceDiscovery,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            shared,
            discovery,
            cancel_rx,
        }
    }

    #[instrument(skip(self), fields(session = self.shared.session_id))]
    pub async fn run(mut self) {
        let every = self.shared.config.discovery_interval;
        debug!("starting discoverer (every {every:?})");

        let mut ticker = time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.cancel_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *self.cancel_rx.borrow() {
                break;
            }

            // A sweep may take a while; abandon it on shutdown. Nothing has
            // been written at that point.
            let found = tokio::select! {
                found = self.discovery.discover() => found,
                _ = self.cancel_rx.changed() => break,
            };
            merge_discovered(&self.shared, found).await;
        }

        debug!("discoverer stopped");
    }
}

/// Run one discovery pass and merge it. Returns the number of devices found.
pub(crate) async fn discovery_pass(shared: &Shared, discovery: &DeviceDiscovery) -> usize {
    let found = discovery.discover().await;
    merge_discovered(shared, found).await
}

/// Upsert each device, then merge it into the registry.
///
/// A device whose upsert fails is skipped for this pass: without a row id
/// its quality tests could not be persisted.
#[instrument(skip_all, fields(found = found.len()))]
async fn merge_discovered(shared: &Shared, found: Vec<Neighbor>) -> usize {
    let now = Utc::now();
    let mut merged = 0;

    for neighbor in found {
        let device = Device {
            mac: neighbor.mac,
            ip: neighbor.ip,
            hostname: neighbor.hostname,
            first_seen: now,
            last_seen: now,
            is_active: true,
        };

        let device_id = match shared.store.upsert_device(&device).await {
            Ok(id) => id,
            Err(e) => {
                warn!("skipping device {}: {e}", device.key());
                continue;
            }
        };

        let outcome = shared.registry.lock().await.merge(device_id, device);
        if outcome == MergeOutcome::Reactivated {
            shared.buffer.lock().await.cancel_deactivation(device_id);
        }
        merged += 1;
    }

    shared.stats.lock().await.discovery_passes += 1;
    debug!("merged {merged} devices");
    merged
}
