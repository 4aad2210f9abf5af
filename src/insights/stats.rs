//! Statistics over hourly buckets

use std::fmt;

use serde::Serialize;

use crate::storage::HourlyAggregate;
use crate::util::{mean, std_dev};

/// Buckets needed for the sample-size factor of [`confidence`] to reach
/// about 63% (one day of hourly data).
const CONFIDENCE_SCALE: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLevel {
    Low,
    Medium,
    High,
}

impl UsageLevel {
    /// Compare a bucket's bandwidth with `mean ± factor * std_dev`.
    ///
    /// Values exactly on a threshold are medium, so a flat series is all
    /// medium.
    pub fn classify(value: f64, mean: f64, std_dev: f64, factor: f64) -> UsageLevel {
        let margin = factor * std_dev;
        if value > mean + margin {
            UsageLevel::High
        } else if value < mean - margin {
            UsageLevel::Low
        } else {
            UsageLevel::Medium
        }
    }
}

impl fmt::Display for UsageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageLevel::Low => write!(f, "low"),
            UsageLevel::Medium => write!(f, "medium"),
            UsageLevel::High => write!(f, "high"),
        }
    }
}

/// One hour of day averaged over every day of the window with data for it.
///
/// Usage patterns are ranked on this fold, so an hour that is busy every
/// day outweighs a single busy hour on one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourProfile {
    pub hour: u32,
    pub mean_bandwidth_mbps: f64,
    pub mean_active_devices: f64,
    pub mean_latency_ms: Option<f64>,
    /// Populated hourly buckets folded into this hour
    pub buckets: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct HourSums {
    bandwidth: f64,
    devices: f64,
    latency: f64,
    latency_buckets: usize,
    buckets: usize,
}

/// Fold wall-clock buckets into their hour of day, ordered by hour. Hours
/// without any bucket are absent.
pub fn hour_of_day_profile(buckets: &[HourlyAggregate]) -> Vec<HourProfile> {
    let mut sums = [HourSums::default(); 24];
    for bucket in buckets {
        let slot = &mut sums[bucket.hour_of_day() as usize];
        slot.bandwidth += bucket.mean_bandwidth_mbps;
        slot.devices += bucket.mean_active_devices;
        if let Some(latency) = bucket.mean_latency_ms {
            slot.latency += latency;
            slot.latency_buckets += 1;
        }
        slot.buckets += 1;
    }

    sums.iter()
        .enumerate()
        .filter(|(_, slot)| slot.buckets > 0)
        .map(|(hour, slot)| {
            let n = slot.buckets as f64;
            HourProfile {
                hour: hour as u32,
                mean_bandwidth_mbps: slot.bandwidth / n,
                mean_active_devices: slot.devices / n,
                mean_latency_ms: (slot.latency_buckets > 0)
                    .then(|| slot.latency / slot.latency_buckets as f64),
                buckets: slot.buckets,
            }
        })
        .collect()
}

/// Mean and population standard deviation of the per-hour bandwidths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandwidthStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl BandwidthStats {
    pub fn of(hours: &[HourProfile]) -> Option<Self> {
        let values: Vec<f64> = hours.iter().map(|h| h.mean_bandwidth_mbps).collect();
        Some(Self {
            mean: mean(&values)?,
            std_dev: std_dev(&values)?,
        })
    }

    /// Relative spread; zero for an all-zero series.
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean > 0.0 {
            self.std_dev / self.mean
        } else {
            0.0
        }
    }
}

/// Confidence in `[0, 1]` for insights drawn from `buckets` hourly buckets
/// with the given coefficient of variation.
///
/// Grows with the number of buckets and shrinks with relative spread. For a
/// fixed spread it never decreases as buckets are added.
pub fn confidence(buckets: usize, coefficient_of_variation: f64) -> f64 {
    if buckets == 0 || !coefficient_of_variation.is_finite() {
        return 0.0;
    }

    let coverage = 1.0 - (-(buckets as f64) / CONFIDENCE_SCALE).exp();
    let consistency = 1.0 / (1.0 + coefficient_of_variation.max(0.0));
    (coverage * consistency).clamp(0.0, 1.0)
}

/// Index of the hour with the strictly largest bandwidth. The earliest
/// hour wins a tie.
pub fn peak_hour(hours: &[HourProfile]) -> Option<usize> {
    let mut peak: Option<usize> = None;
    for (index, hour) in hours.iter().enumerate() {
        match peak {
            Some(best) if hour.mean_bandwidth_mbps <= hours[best].mean_bandwidth_mbps => {}
            _ => peak = Some(index),
        }
    }
    peak
}

/// Index of the hour with the smallest bandwidth, earliest on a tie.
pub fn quietest_hour(hours: &[HourProfile]) -> Option<usize> {
    let mut quietest: Option<usize> = None;
    for (index, hour) in hours.iter().enumerate() {
        match quietest {
            Some(best) if hour.mean_bandwidth_mbps >= hours[best].mean_bandwidth_mbps => {}
            _ => quietest = Some(index),
        }
    }
    quietest
}

/// Collapse hours of day into `HH:00-HH:00` ranges of consecutive hours.
pub fn hours_to_ranges(hours: &[u32]) -> Vec<String> {
    let mut hours = hours.to_vec();
    hours.sort_unstable();
    hours.dedup();

    let Some((&first, rest)) = hours.split_first() else {
        return Vec::new();
    };

    let mut ranges = Vec::new();
    let (mut start, mut prev) = (first, first);
    for &hour in rest {
        if hour != prev + 1 {
            ranges.push(format_range(start, prev));
            start = hour;
        }
        prev = hour;
    }
    ranges.push(format_range(start, prev));
    ranges
}

fn format_range(start: u32, last: u32) -> String {
    format!("{start:02}:00-{:02}:00", last + 1)
}
