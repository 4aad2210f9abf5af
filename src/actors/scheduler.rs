//! SchedulerActor - the tick loop
//!
//! ## Message Flow
//!
//! ```text
//! tick → sample bandwidth → (cancel?) → probe device at cursor → merge into buffer
//!                                            ↑
//!                          DeviceRegistry rotation (round-robin)
//! ```
//!
//! Locks are taken only around in-memory steps. The bandwidth sample and the
//! probe run with no lock held.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, instrument, trace, warn};

use super::registry::ProbeTarget;
use super::service::Shared;
use crate::monitors::{BandwidthRate, CounterSample, ProbeEngine, ProbeEvaluation, QualityResult};
use crate::storage::{Deactivation, PendingQualityTest, QualityTest};
use crate::{NetworkSnapshot, QualityRating};

struct ProbeOutcome {
    target: ProbeTarget,
    result: QualityResult,
    evaluation: ProbeEvaluation,
}

pub struct SchedulerActor {
    shared: Arc<Shared>,
    engine: ProbeEngine,
    cancel_rx: watch::Receiver<bool>,

    /// Counter sample of the previous tick; rates are deltas against it
    previous: Option<CounterSample>,

    /// Snapshot timestamps never go backwards, even if the wall clock does
    last_timestamp: Option<DateTime<Utc>>,
}

impl SchedulerActor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        engine: ProbeEngine,
        cancel_rx: watch::Receiver<bool>,
        initial: Option<CounterSample>,
    ) -> Self {
        Self {
            shared,
            engine,
            cancel_rx,
            previous: initial,
            last_timestamp: None,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Run until cancelled. The tick in flight when cancellation arrives is
    /// completed and merged before returning.
    #[instrument(skip(self), fields(session = self.shared.session_id))]
    pub async fn run(mut self) {
        debug!("starting scheduler");

        let mut ticker = time::interval(self.shared.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.cancel_rx.changed() => {
                    if changed.is_err() {
                        debug!("monitor handle dropped");
                        break;
                    }
                }
            }

            if self.is_cancelled() {
                break;
            }
            self.tick().await;
        }

        debug!("scheduler stopped");
    }

    pub(crate) async fn tick(&mut self) {
        let (rate, interfaces) = self.sample_bandwidth().await;

        // Cancellation between the two steps skips the probe, not the merge
        let outcome = if self.is_cancelled() {
            trace!("cancelled after bandwidth sample, skipping probe");
            None
        } else {
            self.probe_next().await
        };

        self.merge(rate, interfaces, outcome).await;
    }

    async fn sample_bandwidth(&mut self) -> (BandwidthRate, Vec<String>) {
        match self.engine.sample_bandwidth().await {
            Ok(sample) => {
                let rate = self
                    .previous
                    .as_ref()
                    .map(|previous| BandwidthRate::between(previous, &sample))
                    .unwrap_or_default();
                let interfaces = sample.interfaces.clone();
                self.previous = Some(sample);
                (rate, interfaces)
            }
            Err(e) => {
                warn!("bandwidth sample failed: {e}");
                self.shared.stats.lock().await.bandwidth_failures += 1;
                (BandwidthRate::default(), Vec::new())
            }
        }
    }

    async fn probe_next(&mut self) -> Option<ProbeOutcome> {
        let target = self.shared.registry.lock().await.next_target()?;

        let result = self.engine.probe_device(target.ip).await;

        let evaluation = self.shared.registry.lock().await.record_probe(
            &target.key,
            result.status.is_failure(),
            self.shared.config.dormant_after_failures,
        );

        Some(ProbeOutcome {
            target,
            result,
            evaluation,
        })
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }

    async fn merge(
        &mut self,
        rate: BandwidthRate,
        interfaces: Vec<String>,
        outcome: Option<ProbeOutcome>,
    ) {
        let timestamp = self.next_timestamp();
        let active_devices = self.shared.registry.lock().await.active_count();
        let active_devices = u32::try_from(active_devices).unwrap_or(u32::MAX);

        let (latency, packet_loss, tested_device) = match &outcome {
            Some(o) => (o.result.latency_ms, Some(o.result.packet_loss), Some(o.target.ip)),
            None => (None, None, None),
        };

        let snapshot = NetworkSnapshot {
            timestamp,
            upload_mbps: rate.upload_mbps,
            download_mbps: rate.download_mbps,
            usage_mb: rate.usage_mb,
            active_devices,
            avg_latency_ms: latency,
            packet_loss,
            quality: QualityRating::assess(latency, packet_loss.unwrap_or(0.0), active_devices),
            interfaces,
            tested_device,
        };

        let test = outcome.as_ref().map(|o| PendingQualityTest {
            device_id: o.target.device_id,
            test: QualityTest {
                timestamp,
                result: o.result.clone(),
            },
        });
        let deactivated = outcome
            .as_ref()
            .filter(|o| o.evaluation == ProbeEvaluation::GoesDormant)
            .map(|o| Deactivation {
                device_id: o.target.device_id,
                at: timestamp,
            });

        trace!(
            "tick: up={:.3} down={:.3} Mbps, quality={}",
            snapshot.upload_mbps, snapshot.download_mbps, snapshot.quality
        );

        self.shared
            .buffer
            .lock()
            .await
            .record(snapshot, test, deactivated);

        let mut stats = self.shared.stats.lock().await;
        stats.ticks += 1;
        if let Some(outcome) = &outcome {
            stats.probes += 1;
            if outcome.result.status.is_failure() {
                stats.probe_failures += 1;
            }
            if outcome.evaluation == ProbeEvaluation::GoesDormant {
                stats.devices_gone_dormant += 1;
            }
        }
    }
}
