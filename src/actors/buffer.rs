use std::mem;

use tracing::warn;

use crate::NetworkSnapshot;
use crate::storage::{Deactivation, FlushBatch, PendingQualityTest};

/// The live accumulator between ticks and flushes.
///
/// Every tick lands through one [`SnapshotBuffer::record`] call while the
/// caller holds the lock, so a concurrent flush or display read sees either
/// all of a tick or none of it.
#[derive(Debug)]
pub struct SnapshotBuffer {
    latest: Option<NetworkSnapshot>,
    pending: FlushBatch,
    max_snapshots: usize,
    dropped: u64,
}

impl SnapshotBuffer {
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            latest: None,
            pending: FlushBatch::default(),
            max_snapshots: max_snapshots.max(1),
            dropped: 0,
        }
    }

    /// Merge one tick: its snapshot, the quality test that landed on it and
    /// a deactivation if the probed device just went dormant.
    pub fn record(
        &mut self,
        snapshot: NetworkSnapshot,
        test: Option<PendingQualityTest>,
        deactivated: Option<Deactivation>,
    ) {
        self.latest = Some(snapshot.clone());
        self.pending.snapshots.push(snapshot);
        self.pending.quality_tests.extend(test);
        self.pending.deactivations.extend(deactivated);
        self.enforce_bound();
    }

    /// Drop a queued deactivation for a device that was rediscovered before
    /// the flush got to it.
    pub fn cancel_deactivation(&mut self, device_id: i64) {
        self.pending
            .deactivations
            .retain(|deactivation| deactivation.device_id != device_id);
    }

    /// Hand everything pending to a flush and start over.
    pub fn take_batch(&mut self) -> FlushBatch {
        mem::take(&mut self.pending)
    }

    /// Put a failed batch back in front of what accumulated meanwhile.
    pub fn requeue(&mut self, mut batch: FlushBatch) {
        batch.snapshots.append(&mut self.pending.snapshots);
        batch.quality_tests.append(&mut self.pending.quality_tests);
        batch
            .deactivations
            .append(&mut self.pending.deactivations);
        self.pending = batch;
        self.enforce_bound();
    }

    /// Oldest snapshots (and the tests that predate the survivors) go first.
    fn enforce_bound(&mut self) {
        let excess = self.pending.snapshots.len().saturating_sub(self.max_snapshots);
        if excess == 0 {
            return;
        }

        self.pending.snapshots.drain(..excess);
        if let Some(oldest) = self.pending.snapshots.first().map(|s| s.timestamp) {
            self.pending
                .quality_tests
                .retain(|pending| pending.test.timestamp >= oldest);
        }
        self.dropped += excess as u64;
        warn!("snapshot buffer full, dropped {excess} oldest snapshots");
    }

    /// Copy of the most recent snapshot
    pub fn latest(&self) -> Option<NetworkSnapshot> {
        self.latest.clone()
    }

    pub fn buffered_snapshots(&self) -> usize {
        self.pending.snapshots.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
