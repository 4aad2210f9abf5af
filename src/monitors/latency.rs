use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::trace;

use super::ProbeError;
use crate::util::{mean, std_dev};

/// Outcome class of one quality probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// Every echo was answered
    Success,
    /// Some echoes were lost
    Partial,
    /// No echo was answered; latency is recorded as failed
    Timeout,
}

impl ProbeStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, ProbeStatus::Timeout)
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeStatus::Success => "success",
            ProbeStatus::Partial => "partial",
            ProbeStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

impl FromStr for ProbeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ProbeStatus::Success),
            "partial" => Ok(ProbeStatus::Partial),
            "timeout" => Ok(ProbeStatus::Timeout),
            other => Err(format!("unknown probe status: {other}")),
        }
    }
}

/// Summary of the echo attempts made against one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    /// Mean round trip of answered echoes; `None` when all were lost
    pub latency_ms: Option<f64>,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    /// Population standard deviation of the answered round trips
    pub jitter_ms: Option<f64>,
    /// Fraction of echoes lost, in [0, 1]
    pub packet_loss: f64,
    pub status: ProbeStatus,
}

impl QualityResult {
    pub fn from_latencies(latencies: &[f64], attempts: u32) -> Self {
        let attempts = attempts.max(1) as f64;
        let answered = latencies.len() as f64;
        let packet_loss = ((attempts - answered) / attempts).clamp(0.0, 1.0);

        let status = if latencies.is_empty() {
            ProbeStatus::Timeout
        } else if packet_loss > 0.0 {
            ProbeStatus::Partial
        } else {
            ProbeStatus::Success
        };

        Self {
            latency_ms: mean(latencies),
            min_latency_ms: latencies.iter().copied().reduce(f64::min),
            max_latency_ms: latencies.iter().copied().reduce(f64::max),
            jitter_ms: std_dev(latencies),
            packet_loss,
            status,
        }
    }

    /// Result recorded for a probe that never got an answer.
    pub fn failed() -> Self {
        Self::from_latencies(&[], 1)
    }
}

static RTT_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]+)?)\s*ms"));

/// Extract the round trip reported by `ping`, e.g. `time=0.412 ms`.
pub fn parse_ping_rtt(output: &str) -> Option<Duration> {
    let pattern = RTT_PATTERN.as_ref().ok()?;
    let captures = pattern.captures(output)?;
    let millis: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_micros((millis * 1000.0).round() as u64))
}

/// Send one echo via the system `ping` binary.
///
/// The child is killed if the surrounding timeout drops this future.
pub async fn ping_once(ip: IpAddr, timeout: Duration) -> Result<Option<Duration>, ProbeError> {
    let wait_secs = timeout.as_secs().max(1).to_string();
    let mut command = Command::new("ping");
    if ip.is_ipv6() {
        command.arg("-6");
    }
    command
        .args(["-n", "-c", "1", "-W", &wait_secs])
        .arg(ip.to_string())
        .kill_on_drop(true);

    let started = Instant::now();
    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(output) => output?,
        Err(_) => return Ok(None),
    };

    if !output.status.success() {
        trace!("ping {ip} exited with {}", output.status);
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Some(parse_ping_rtt(&stdout).unwrap_or_else(|| started.elapsed())))
}
