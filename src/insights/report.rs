//! Text templates for insights and the plain-text report

use std::fmt::Write;

use chrono::Utc;

use super::UsageInsight;
use crate::storage::TimeWindow;

fn hour_range(hour: u32) -> String {
    format!("{hour:02}:00-{:02}:00", hour + 1)
}

fn list_or_none(ranges: &[String]) -> String {
    if ranges.is_empty() {
        "none".to_string()
    } else {
        ranges.join(", ")
    }
}

pub(crate) fn insufficient_data(found: usize, needed: usize) -> (String, String) {
    (
        "Not enough data yet".to_string(),
        format!(
            "Only {found} of the {needed} hourly buckets needed for an analysis have data. \
             Keep the monitor running and check back later."
        ),
    )
}

pub(crate) fn peak_hour(hour: u32, peak_mbps: f64, mean_mbps: f64) -> (String, String) {
    (
        format!("Peak bandwidth hour {}", hour_range(hour)),
        format!(
            "The busiest hour is {} UTC at {peak_mbps:.1} Mbps, against an hourly average of \
             {mean_mbps:.1} Mbps.",
            hour_range(hour)
        ),
    )
}

pub(crate) fn congestion(
    high_ranges: &[String],
    low_ranges: &[String],
    threshold_mbps: f64,
    latency_ms: Option<f64>,
) -> (String, String) {
    let mut description = format!(
        "Usage above {threshold_mbps:.1} Mbps during {} UTC. Quiet periods: {}.",
        list_or_none(high_ranges),
        list_or_none(low_ranges)
    );
    if let Some(latency) = latency_ms {
        let _ = write!(description, " Latency in busy hours averages {latency:.1} ms.");
    }
    ("Congested hours detected".to_string(), description)
}

pub(crate) fn device_pattern(hour: u32, devices: f64) -> (String, String) {
    (
        "Most connected devices".to_string(),
        format!(
            "Most devices are active during {} UTC, {devices:.1} on average.",
            hour_range(hour)
        ),
    )
}

pub(crate) fn high_peak_latency(latency_ms: f64) -> (String, String) {
    (
        "High latency at peak times".to_string(),
        format!(
            "Latency averages {latency_ms:.1} ms during the busiest hours. Consider a faster \
             plan or prioritising interactive traffic during those hours."
        ),
    )
}

pub(crate) fn usage_variation(ratio: f64, quiet_hour: u32) -> (String, String) {
    (
        "Schedule heavy transfers".to_string(),
        format!(
            "The busiest hour carries {ratio:.1}x the traffic of the quietest. Large downloads \
             and backups fit best around {} UTC.",
            hour_range(quiet_hour)
        ),
    )
}

pub(crate) fn device_density(devices: f64) -> (String, String) {
    (
        "Many concurrent devices".to_string(),
        format!(
            "Up to {devices:.1} devices are active at once. A mesh network or an additional \
             access point would spread the load."
        ),
    )
}

/// Plain-text summary of a set of insights.
pub fn render_report(insights: &[UsageInsight], window: TimeWindow) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "NETWORK USAGE INSIGHTS");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "Window:    {} .. {}",
        window.start.format("%Y-%m-%d %H:%M"),
        window.end.format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(out, "Generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out);

    for (i, insight) in insights.iter().enumerate() {
        let heading = format!("{}. [{}] {}", i + 1, insight.kind, insight.title);
        let _ = writeln!(out, "{heading}");
        let _ = writeln!(out, "{}", "-".repeat(heading.len()));
        let _ = writeln!(
            out,
            "Confidence: {:.0}%   Hourly buckets: {}",
            insight.confidence * 100.0,
            insight.data_points
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", insight.description);
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{rule}");
    out
}
