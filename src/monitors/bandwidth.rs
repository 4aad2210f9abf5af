use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sysinfo::Networks;
use tokio::time::Instant;
use tracing::trace;

use super::latency::ping_once;
use super::{Probe, ProbeError};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Cumulative interface byte counters at one instant.
#[derive(Debug, Clone)]
pub struct CounterSample {
    pub taken_at: Instant,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub interfaces: Vec<String>,
}

impl CounterSample {
    pub fn new(bytes_sent: u64, bytes_recv: u64, interfaces: Vec<String>) -> Self {
        Self {
            taken_at: Instant::now(),
            bytes_sent,
            bytes_recv,
            interfaces,
        }
    }
}

/// Throughput derived from two consecutive counter samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BandwidthRate {
    pub upload_mbps: f64,
    pub download_mbps: f64,
    pub usage_mb: f64,
}

impl BandwidthRate {
    /// Rate between `previous` and `current`.
    ///
    /// A counter that went backwards (interface reset, wrap) contributes
    /// nothing rather than a huge bogus rate.
    pub fn between(previous: &CounterSample, current: &CounterSample) -> Self {
        let elapsed = current
            .taken_at
            .saturating_duration_since(previous.taken_at)
            .as_secs_f64();
        if elapsed <= 0.0 {
            return Self::default();
        }

        let sent = current.bytes_sent.saturating_sub(previous.bytes_sent) as f64;
        let recv = current.bytes_recv.saturating_sub(previous.bytes_recv) as f64;

        Self {
            upload_mbps: sent * 8.0 / BYTES_PER_MB / elapsed,
            download_mbps: recv * 8.0 / BYTES_PER_MB / elapsed,
            usage_mb: (sent + recv) / BYTES_PER_MB,
        }
    }
}

/// Probe backed by the host: sysinfo byte counters and the system `ping`.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    interface: Option<String>,
}

impl SystemProbe {
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }

    fn read_counters(interface: Option<&str>) -> Result<CounterSample, ProbeError> {
        let networks = Networks::new_with_refreshed_list();

        let mut sent = 0u64;
        let mut recv = 0u64;
        let mut names = Vec::new();

        for (name, data) in networks.iter() {
            let selected = match interface {
                Some(wanted) => name == wanted,
                None => !is_loopback(name),
            };
            if !selected {
                continue;
            }
            sent = sent.saturating_add(data.total_transmitted());
            recv = recv.saturating_add(data.total_received());
            names.push(name.clone());
        }

        if names.is_empty() {
            return Err(ProbeError::NoInterface(
                interface.unwrap_or("any non-loopback").to_string(),
            ));
        }

        names.sort();
        trace!("read counters from {names:?}: sent={sent} recv={recv}");
        Ok(CounterSample::new(sent, recv, names))
    }
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.starts_with("Loopback")
}

#[async_trait]
impl Probe for SystemProbe {
    async fn sample_counters(&self) -> Result<CounterSample, ProbeError> {
        let interface = self.interface.clone();
        tokio::task::spawn_blocking(move || Self::read_counters(interface.as_deref()))
            .await
            .map_err(|e| ProbeError::Failed(format!("counter reader panicked: {e}")))?
    }

    async fn echo(&self, ip: IpAddr, timeout: Duration) -> Result<Option<Duration>, ProbeError> {
        ping_once(ip, timeout).await
    }
}
