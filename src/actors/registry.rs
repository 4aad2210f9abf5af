use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::rotation::Rotation;
use crate::monitors::ProbeEvaluation;
use crate::{Device, DeviceKey};

/// A known device plus its probe bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedDevice {
    /// Row id in the `devices` table
    pub id: i64,
    pub device: Device,
    pub consecutive_failures: u32,
}

/// What [`DeviceRegistry::merge`] did with a discovered device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First sighting; joined the rotation tail
    Inserted,
    /// Already active; `last_seen` refreshed
    Refreshed,
    /// Was dormant; active again and back at the rotation tail
    Reactivated,
}

/// Next device to probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTarget {
    pub key: DeviceKey,
    pub device_id: i64,
    pub ip: IpAddr,
}

/// Live device list and the round-robin cursor over its active members.
///
/// Devices are deactivated by the scheduler after repeated probe failures
/// and by retention cleanup once unseen for the retention period. Discovery
/// only inserts, refreshes and reactivates.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceKey, TrackedDevice>,
    rotation: Rotation<DeviceKey>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one discovered device, already upserted as row `device_id`.
    ///
    /// Devices missing from a pass are left untouched.
    pub fn merge(&mut self, device_id: i64, device: Device) -> MergeOutcome {
        let key = device.key();

        let Some(tracked) = self.devices.get_mut(&key) else {
            debug!("new device {key}");
            self.rotation.push(key);
            self.devices.insert(
                key,
                TrackedDevice {
                    id: device_id,
                    device,
                    consecutive_failures: 0,
                },
            );
            return MergeOutcome::Inserted;
        };

        tracked.id = device_id;
        tracked.device.last_seen = tracked.device.last_seen.max(device.last_seen);
        if device.hostname.is_some() {
            tracked.device.hostname = device.hostname;
        }

        if tracked.device.is_active {
            return MergeOutcome::Refreshed;
        }

        info!("device {key} rediscovered, back in rotation");
        tracked.device.is_active = true;
        tracked.consecutive_failures = 0;
        self.rotation.push(key);
        MergeOutcome::Reactivated
    }

    /// Device at the rotation cursor; advances the cursor.
    pub fn next_target(&mut self) -> Option<ProbeTarget> {
        let key = self.rotation.advance()?;
        let tracked = self.devices.get(&key)?;
        Some(ProbeTarget {
            key,
            device_id: tracked.id,
            ip: tracked.device.ip,
        })
    }

    /// Apply one probe outcome. A device reaching `threshold` consecutive
    /// failures is deactivated and leaves the rotation.
    pub fn record_probe(&mut self, key: &DeviceKey, failed: bool, threshold: u32) -> ProbeEvaluation {
        let Some(tracked) = self.devices.get_mut(key) else {
            // Unknown key: treat as a one-off success so nothing is deactivated
            return ProbeEvaluation::Healthy;
        };

        let evaluation = ProbeEvaluation::evaluate(failed, threshold, tracked.consecutive_failures);
        tracked.consecutive_failures = evaluation.next_count(tracked.consecutive_failures);

        match evaluation {
            ProbeEvaluation::GoesDormant => {
                info!(
                    "device {key} dormant after {} failed probes",
                    tracked.consecutive_failures
                );
                tracked.device.is_active = false;
                self.rotation.remove(key);
            }
            ProbeEvaluation::Recovered => debug!("device {key} answered again"),
            ProbeEvaluation::Healthy | ProbeEvaluation::Failing => {}
        }

        evaluation
    }

    /// Deactivate every active device last seen before `cutoff`, mirroring
    /// what retention cleanup did to the `devices` table. Returns how many
    /// left the rotation.
    pub fn retire_unseen_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut retired = 0;
        for (key, tracked) in &mut self.devices {
            if tracked.device.is_active && tracked.device.last_seen < cutoff {
                debug!("device {key} unseen since {}, retired", tracked.device.last_seen);
                tracked.device.is_active = false;
                tracked.consecutive_failures = 0;
                self.rotation.remove(key);
                retired += 1;
            }
        }
        retired
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&TrackedDevice> {
        self.devices.get(key)
    }

    pub fn active_count(&self) -> usize {
        self.rotation.len()
    }

    pub fn known_count(&self) -> usize {
        self.devices.len()
    }

    pub fn rotation_len(&self) -> usize {
        self.rotation.len()
    }

    /// Copy of every known device, ordered by address
    pub fn devices(&self) -> Vec<TrackedDevice> {
        let mut devices: Vec<TrackedDevice> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.device.ip.cmp(&b.device.ip).then(a.id.cmp(&b.id)));
        devices
    }

    /// Keys in rotation order starting at the cursor
    pub fn rotation_order(&self) -> Vec<DeviceKey> {
        let keys: Vec<DeviceKey> = self.rotation.iter().copied().collect();
        if keys.is_empty() {
            return keys;
        }
        let start = self.rotation.cursor() % keys.len();
        keys[start..].iter().chain(&keys[..start]).copied().collect()
    }
}
