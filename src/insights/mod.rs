//! InsightEngine - usage patterns from persisted telemetry
//!
//! ## Pipeline
//!
//! ```text
//! query_hourly_aggregate(window) → enough buckets? ─no─→ [insufficient_data]
//!                                        │ yes
//!                                        ▼
//!            fold by hour of day → mean / std-dev → classify hours → peak,
//!                                         congestion, device pattern,
//!                                         recommendations
//! ```
//!
//! The engine only reads. Insights are returned to the caller, never
//! written back.

pub mod report;
pub mod stats;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

pub use report::render_report;
pub use stats::{BandwidthStats, HourProfile, UsageLevel, confidence, hours_to_ranges};

use crate::config::InsightConfig;
use crate::storage::{HourlyAggregate, MonitorStore, StorageResult, TimeWindow};

/// Mean latency in busy hours above which a faster plan is suggested
const PEAK_LATENCY_MS: f64 = 50.0;

/// Busiest/quietest bandwidth ratio above which transfers should be moved
const VARIATION_RATIO: f64 = 3.0;

/// Mean concurrent devices above which more access points are suggested
const DEVICE_DENSITY: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    PeakHour,
    Congestion,
    DevicePattern,
    Recommendation,
    InsufficientData,
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InsightKind::PeakHour => "peak_hour",
            InsightKind::Congestion => "congestion",
            InsightKind::DevicePattern => "device_pattern",
            InsightKind::Recommendation => "recommendation",
            InsightKind::InsufficientData => "insufficient_data",
        };
        write!(f, "{name}")
    }
}

/// One confidence-scored statement about the usage in a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageInsight {
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub window: TimeWindow,
    /// In `[0, 1]`; exactly 0 for `insufficient_data`
    pub confidence: f64,
    /// Populated hourly buckets the insight is based on
    pub data_points: usize,
    /// Supporting numbers, keyed by name. Empty for `insufficient_data`.
    pub metrics: BTreeMap<String, f64>,
}

impl UsageInsight {
    fn new(
        kind: InsightKind,
        (title, description): (String, String),
        window: TimeWindow,
        confidence: f64,
        data_points: usize,
    ) -> Self {
        Self {
            kind,
            title,
            description,
            window,
            confidence,
            data_points,
            metrics: BTreeMap::new(),
        }
    }

    fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

pub struct InsightEngine {
    store: Arc<dyn MonitorStore>,
    config: InsightConfig,
}

/// Everything the individual insights are derived from
struct Analysis {
    window: TimeWindow,
    /// Populated wall-clock buckets behind the profile
    buckets: usize,
    hours: Vec<HourProfile>,
    stats: BandwidthStats,
    levels: Vec<UsageLevel>,
    confidence: f64,
}

impl Analysis {
    fn insight(&self, kind: InsightKind, text: (String, String)) -> UsageInsight {
        UsageInsight::new(kind, text, self.window, self.confidence, self.buckets)
    }

    fn hours_at(&self, level: UsageLevel) -> Vec<u32> {
        self.hours
            .iter()
            .zip(&self.levels)
            .filter(|(_, l)| **l == level)
            .map(|(h, _)| h.hour)
            .collect()
    }

    fn count_at(&self, level: UsageLevel) -> usize {
        self.levels.iter().filter(|l| **l == level).count()
    }

    /// Mean latency of the high-usage hours, or of the peak hour if nothing
    /// stands out.
    fn busy_latency(&self, peak: usize) -> Option<f64> {
        let busy: Vec<f64> = self
            .hours
            .iter()
            .zip(&self.levels)
            .filter(|(_, l)| **l == UsageLevel::High)
            .filter_map(|(h, _)| h.mean_latency_ms)
            .collect();

        match crate::util::mean(&busy) {
            Some(latency) => Some(latency),
            None => self.hours[peak].mean_latency_ms,
        }
    }
}

impl InsightEngine {
    pub fn new(store: Arc<dyn MonitorStore>, config: InsightConfig) -> Self {
        Self { store, config }
    }

    /// Insights for `window`, read through the hourly aggregate.
    ///
    /// Too little data is not an error: the result is then a single
    /// `insufficient_data` insight.
    #[instrument(skip(self), fields(start = %window.start, end = %window.end))]
    pub async fn generate_insights(&self, window: TimeWindow) -> StorageResult<Vec<UsageInsight>> {
        let buckets = self.store.query_hourly_aggregate(window).await?;
        debug!("{} populated hourly buckets", buckets.len());
        Ok(analyze(&self.config, window, &buckets))
    }
}

/// Insights from already aggregated buckets, ordered by hour.
///
/// The buckets are folded by hour of day before ranking; the minimum is
/// checked against the populated buckets themselves.
pub fn analyze(
    config: &InsightConfig,
    window: TimeWindow,
    buckets: &[HourlyAggregate],
) -> Vec<UsageInsight> {
    let needed = config.min_insight_buckets.max(1);
    let hours = stats::hour_of_day_profile(buckets);

    let (stats, peak) = match (BandwidthStats::of(&hours), stats::peak_hour(&hours)) {
        (Some(stats), Some(peak)) if buckets.len() >= needed => (stats, peak),
        _ => {
            return vec![UsageInsight::new(
                InsightKind::InsufficientData,
                report::insufficient_data(buckets.len(), needed),
                window,
                0.0,
                buckets.len(),
            )];
        }
    };

    let analysis = Analysis {
        window,
        buckets: buckets.len(),
        levels: classify(&hours, &stats, config.threshold_factor),
        confidence: confidence(buckets.len(), stats.coefficient_of_variation()),
        hours,
        stats,
    };

    let mut insights = vec![peak_hour(&analysis, peak)];
    insights.extend(congestion(&analysis, peak, config.threshold_factor));
    insights.extend(device_pattern(&analysis));
    insights.extend(recommendations(&analysis, peak));

    debug!("generated {} insights", insights.len());
    insights
}

/// Usage level of each hour of day against the profile's mean and spread
pub fn classify(hours: &[HourProfile], stats: &BandwidthStats, factor: f64) -> Vec<UsageLevel> {
    hours
        .iter()
        .map(|h| UsageLevel::classify(h.mean_bandwidth_mbps, stats.mean, stats.std_dev, factor))
        .collect()
}

fn peak_hour(analysis: &Analysis, peak: usize) -> UsageInsight {
    let hour = &analysis.hours[peak];

    analysis
        .insight(
            InsightKind::PeakHour,
            report::peak_hour(hour.hour, hour.mean_bandwidth_mbps, analysis.stats.mean),
        )
        .with_metric("peak_hour", hour.hour as f64)
        .with_metric("peak_mbps", hour.mean_bandwidth_mbps)
        .with_metric("mean_mbps", analysis.stats.mean)
        .with_metric("std_dev_mbps", analysis.stats.std_dev)
}

fn congestion(analysis: &Analysis, peak: usize, factor: f64) -> Option<UsageInsight> {
    let high_hours = analysis.hours_at(UsageLevel::High);
    if high_hours.is_empty() {
        return None;
    }

    let threshold = analysis.stats.mean + factor * analysis.stats.std_dev;
    let latency = analysis.busy_latency(peak);
    let text = report::congestion(
        &hours_to_ranges(&high_hours),
        &hours_to_ranges(&analysis.hours_at(UsageLevel::Low)),
        threshold,
        latency,
    );

    let insight = analysis
        .insight(InsightKind::Congestion, text)
        .with_metric("threshold_mbps", threshold)
        .with_metric("high_hours", analysis.count_at(UsageLevel::High) as f64)
        .with_metric("medium_hours", analysis.count_at(UsageLevel::Medium) as f64)
        .with_metric("low_hours", analysis.count_at(UsageLevel::Low) as f64);

    Some(match latency {
        Some(latency) => insight.with_metric("busy_latency_ms", latency),
        None => insight,
    })
}

fn device_pattern(analysis: &Analysis) -> Option<UsageInsight> {
    let mut busiest: Option<&HourProfile> = None;
    for hour in &analysis.hours {
        if busiest.is_none_or(|best| hour.mean_active_devices > best.mean_active_devices) {
            busiest = Some(hour);
        }
    }

    let busiest = busiest.filter(|h| h.mean_active_devices > 0.0)?;
    Some(
        analysis
            .insight(
                InsightKind::DevicePattern,
                report::device_pattern(busiest.hour, busiest.mean_active_devices),
            )
            .with_metric("hour", busiest.hour as f64)
            .with_metric("mean_active_devices", busiest.mean_active_devices),
    )
}

fn recommendations(analysis: &Analysis, peak: usize) -> Vec<UsageInsight> {
    let mut recommendations = Vec::new();

    if let Some(latency) = analysis.busy_latency(peak).filter(|l| *l > PEAK_LATENCY_MS) {
        recommendations.push(
            analysis
                .insight(InsightKind::Recommendation, report::high_peak_latency(latency))
                .with_metric("busy_latency_ms", latency),
        );
    }

    if let Some(quiet) = stats::quietest_hour(&analysis.hours) {
        let quiet = &analysis.hours[quiet];
        let peak_mbps = analysis.hours[peak].mean_bandwidth_mbps;

        // An idle hour has no meaningful ratio
        if quiet.mean_bandwidth_mbps > 0.0 {
            let ratio = peak_mbps / quiet.mean_bandwidth_mbps;
            if ratio > VARIATION_RATIO {
                recommendations.push(
                    analysis
                        .insight(
                            InsightKind::Recommendation,
                            report::usage_variation(ratio, quiet.hour),
                        )
                        .with_metric("variation_ratio", ratio)
                        .with_metric("quiet_hour", quiet.hour as f64),
                );
            }
        }
    }

    let max_devices = analysis
        .hours
        .iter()
        .map(|h| h.mean_active_devices)
        .fold(0.0, f64::max);
    if max_devices > DEVICE_DENSITY {
        recommendations.push(
            analysis
                .insight(InsightKind::Recommendation, report::device_density(max_devices))
                .with_metric("max_active_devices", max_devices),
        );
    }

    recommendations
}
