//! FlushActor - moves the accumulator into the store
//!
//! ## Batching
//!
//! Ticks accumulate in the [`SnapshotBuffer`](super::buffer::SnapshotBuffer);
//! every `flush_interval` the whole buffer is taken and written in one
//! transaction. A failed write is rolled back by the store, the batch goes
//! back into the buffer and the session is flagged degraded. Monitoring
//! carries on either way.
//!
//! Flushes never overlap: a `flush_now` or the shutdown flush waits for a
//! periodic write in flight, so a requeued batch is always written before
//! anything newer.
//!
//! With `retention_days` set, old telemetry is cleaned up at startup and
//! then daily. Devices the cleanup deactivates also leave the rotation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use super::service::Shared;

/// Retention cleanup runs daily
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct FlushActor {
    shared: Arc<Shared>,
    cancel_rx: watch::Receiver<bool>,
}

impl FlushActor {
    pub(crate) fn new(shared: Arc<Shared>, cancel_rx: watch::Receiver<bool>) -> Self {
        Self { shared, cancel_rx }
    }

    #[instrument(skip(self), fields(session = self.shared.session_id))]
    pub async fn run(mut self) {
        let flush_every = self.shared.config.flush_interval;
        let retention_days = self.shared.retention_days;

        debug!("starting flusher (every {flush_every:?})");

        if let Some(days) = retention_days {
            debug!("running initial retention cleanup");
            run_cleanup(&self.shared, days).await;
        }

        let mut flush_ticker = time::interval_at(Instant::now() + flush_every, flush_every);
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup_ticker =
            time::interval_at(Instant::now() + CLEANUP_INTERVAL, CLEANUP_INTERVAL);

        loop {
            tokio::select! {
                _ = flush_ticker.tick() => {
                    flush(&self.shared).await;
                }

                _ = cleanup_ticker.tick(), if retention_days.is_some() => {
                    if let Some(days) = retention_days {
                        debug!("daily retention cleanup triggered");
                        run_cleanup(&self.shared, days).await;
                    }
                }

                changed = self.cancel_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if *self.cancel_rx.borrow() {
                break;
            }
        }

        // The final flush happens in shutdown, after the scheduler drained
        debug!("flusher stopped");
    }
}

/// Write everything buffered. Returns `false` if the write failed.
#[instrument(skip(shared), fields(session = shared.session_id))]
pub(crate) async fn flush(shared: &Shared) -> bool {
    // Held until the batch is written or back in the buffer
    let _flushing = shared.flush_lock.lock().await;

    let batch = shared.buffer.lock().await.take_batch();
    if batch.is_empty() {
        trace!("nothing to flush");
        return true;
    }

    let count = batch.snapshots.len();
    match shared.store.write_batch(shared.session_id, &batch).await {
        Ok(()) => {
            let mut stats = shared.stats.lock().await;
            stats.flushes += 1;
            stats.consecutive_flush_failures = 0;
            debug!("flush #{} wrote {count} snapshots", stats.flushes);
            true
        }
        Err(e) => {
            error!("flush of {count} snapshots failed: {e}");

            let rejected = e.is_rejection();
            if !rejected {
                shared.buffer.lock().await.requeue(batch);
            }

            {
                let mut stats = shared.stats.lock().await;
                stats.flush_failures += 1;
                stats.consecutive_flush_failures += 1;
                stats.degraded = true;
                if rejected {
                    warn!("store rejected the batch, dropping {count} snapshots");
                    stats.snapshots_dropped += count as u64;
                }
            }

            if let Err(e) = shared.store.mark_session_degraded(shared.session_id).await {
                warn!("could not flag session as degraded: {e}");
            }
            false
        }
    }
}

async fn run_cleanup(shared: &Shared, days: u32) {
    let cutoff = Utc::now() - chrono::Duration::days(days as i64);

    match shared.store.cleanup_before(cutoff).await {
        Ok(stats) => {
            // Keep the rotation in line with the rows just deactivated
            let retired = shared.registry.lock().await.retire_unseen_before(cutoff);
            info!(
                "retention cleanup: {} snapshots, {} quality tests removed, {} devices deactivated ({retired} in rotation)",
                stats.snapshots_deleted, stats.quality_tests_deleted, stats.devices_deactivated
            );
        }
        Err(e) => error!("retention cleanup failed: {e}"),
    }
}
