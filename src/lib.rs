pub mod actors;
pub mod config;
pub mod discovery;
pub mod insights;
pub mod monitors;
pub mod storage;
pub mod util;

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hardware address in upper-case, colon separated form (`AA:BB:CC:DD:EE:FF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// The all-zero address the kernel reports for unresolved neighbors.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; 6]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacError(String);

impl fmt::Display for ParseMacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address: {}", self.0)
    }
}

impl std::error::Error for ParseMacError {}

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(ParseMacError(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(ParseMacError(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_string()))?;
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl Serialize for MacAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of a device on the LAN: the (mac, ip) pair.
///
/// The MAC is optional because the neighbor table does not always resolve
/// it; two keys with the same IP but different MAC knowledge are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceKey {
    pub mac: Option<MacAddr>,
    pub ip: IpAddr,
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mac {
            Some(mac) => write!(f, "{} ({mac})", self.ip),
            None => write!(f, "{}", self.ip),
        }
    }
}

/// A device as known to the registry and the `devices` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub mac: Option<MacAddr>,
    pub ip: IpAddr,
    pub hostname: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
}

impl Device {
    pub fn key(&self) -> DeviceKey {
        DeviceKey {
            mac: self.mac,
            ip: self.ip,
        }
    }
}

/// Coarse connection quality attached to every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRating {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

impl QualityRating {
    /// Rate a latency/loss pair. `packet_loss` is a fraction in [0, 1].
    ///
    /// Busy networks (more than 10 active devices) are downgraded one step
    /// from Excellent or Good.
    pub fn assess(latency_ms: Option<f64>, packet_loss: f64, active_devices: u32) -> Self {
        let Some(latency) = latency_ms else {
            return QualityRating::Unknown;
        };
        let loss_percent = packet_loss * 100.0;

        let base = if loss_percent > 5.0 || latency > 100.0 {
            QualityRating::Poor
        } else if loss_percent > 2.0 || latency > 50.0 {
            QualityRating::Fair
        } else if loss_percent > 0.5 || latency > 25.0 {
            QualityRating::Good
        } else {
            QualityRating::Excellent
        };

        if active_devices > 10 {
            return match base {
                QualityRating::Excellent => QualityRating::Good,
                QualityRating::Good => QualityRating::Fair,
                other => other,
            };
        }

        base
    }

    /// Numeric score used for session summaries; `Unknown` has none.
    pub fn score(&self) -> Option<f64> {
        match self {
            QualityRating::Excellent => Some(4.0),
            QualityRating::Good => Some(3.0),
            QualityRating::Fair => Some(2.0),
            QualityRating::Poor => Some(1.0),
            QualityRating::Unknown => None,
        }
    }
}

impl fmt::Display for QualityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityRating::Excellent => "excellent",
            QualityRating::Good => "good",
            QualityRating::Fair => "fair",
            QualityRating::Poor => "poor",
            QualityRating::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for QualityRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "excellent" => Ok(QualityRating::Excellent),
            "good" => Ok(QualityRating::Good),
            "fair" => Ok(QualityRating::Fair),
            "poor" => Ok(QualityRating::Poor),
            "unknown" => Ok(QualityRating::Unknown),
            other => Err(format!("unknown quality rating: {other}")),
        }
    }
}

/// One aggregated record: bandwidth plus whichever quality probe landed on
/// the same tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub timestamp: DateTime<Utc>,
    pub upload_mbps: f64,
    pub download_mbps: f64,
    pub usage_mb: f64,
    pub active_devices: u32,
    pub avg_latency_ms: Option<f64>,
    pub packet_loss: Option<f64>,
    pub quality: QualityRating,
    pub interfaces: Vec<String>,
    pub tested_device: Option<IpAddr>,
}

impl NetworkSnapshot {
    pub fn total_mbps(&self) -> f64 {
        self.upload_mbps + self.download_mbps
    }
}
