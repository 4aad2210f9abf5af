//! Probe engine: one bandwidth sample or one device quality probe per call.
//!
//! The raw OS facilities (interface byte counters, ICMP echo) sit behind the
//! [`Probe`] trait so the scheduler can be driven by scripted probes in tests.
//! [`ProbeEngine`] adds the bounding timeouts and turns echo attempts into a
//! [`QualityResult`]. It keeps no state between calls.

pub mod bandwidth;
pub mod dormancy;
pub mod latency;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{instrument, trace};

pub use bandwidth::{BandwidthRate, CounterSample, SystemProbe};
pub use dormancy::ProbeEvaluation;
pub use latency::{ProbeStatus, QualityResult};

/// Errors raised by a probe. None of them is fatal to the scheduler.
#[derive(Debug)]
pub enum ProbeError {
    /// The call did not complete within its bound
    Timeout(Duration),

    /// No interface matched the configured filter
    NoInterface(String),

    /// Spawning or talking to an OS facility failed
    Io(std::io::Error),

    /// Anything else reported by the OS facility
    Failed(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout(after) => write!(f, "probe timed out after {after:?}"),
            ProbeError::NoInterface(filter) => write!(f, "no usable network interface ({filter})"),
            ProbeError::Io(err) => write!(f, "probe I/O error: {err}"),
            ProbeError::Failed(msg) => write!(f, "probe failed: {msg}"),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProbeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        ProbeError::Io(err)
    }
}

/// Read-only access to the host's network facilities.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Cumulative byte counters summed over the monitored interfaces.
    async fn sample_counters(&self) -> Result<CounterSample, ProbeError>;

    /// One echo request. `Ok(None)` means no reply within `timeout`.
    async fn echo(&self, ip: IpAddr, timeout: Duration) -> Result<Option<Duration>, ProbeError>;
}

/// Timeout-bounded front end over a [`Probe`].
#[derive(Clone)]
pub struct ProbeEngine {
    probe: Arc<dyn Probe>,
    timeout: Duration,
    samples: u32,
}

impl ProbeEngine {
    pub fn new(probe: Arc<dyn Probe>, timeout: Duration, samples: u32) -> Self {
        Self {
            probe,
            timeout,
            samples: samples.max(1),
        }
    }

    /// Take one counter sample, bounded by the probe timeout.
    #[instrument(skip(self))]
    pub async fn sample_bandwidth(&self) -> Result<CounterSample, ProbeError> {
        match tokio::time::timeout(self.timeout, self.probe.sample_counters()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }

    /// Issue `samples` echo attempts to `ip` and summarise them.
    ///
    /// Never fails: unreachable hosts and probe errors count as lost echoes.
    #[instrument(skip(self))]
    pub async fn probe_device(&self, ip: IpAddr) -> QualityResult {
        let started = Instant::now();
        let mut latencies = Vec::with_capacity(self.samples as usize);

        for attempt in 0..self.samples {
            let reply = tokio::time::timeout(self.timeout, self.probe.echo(ip, self.timeout)).await;
            match reply {
                Ok(Ok(Some(rtt))) => {
                    let latency_ms = rtt.as_micros() as f64 / 1000.0;
                    trace!("echo {attempt} to {ip}: {latency_ms:.2}ms");
                    latencies.push(latency_ms);
                }
                Ok(Ok(None)) | Err(_) => trace!("echo {attempt} to {ip}: timeout"),
                Ok(Err(e)) => trace!("echo {attempt} to {ip}: {e}"),
            }
        }

        let result = QualityResult::from_latencies(&latencies, self.samples);
        trace!(
            "probed {ip} in {:?}: {:?} loss={:.2}",
            started.elapsed(),
            result.status,
            result.packet_loss
        );
        result
    }
}
