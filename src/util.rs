use std::path::PathBuf;

use chrono::{DateTime, Utc};

const NETWATCH_DB: &str = "NETWATCH_DB";

/// Database path override from the environment, if set.
pub fn get_db_path() -> Option<PathBuf> {
    std::env::var(NETWATCH_DB).ok().map(PathBuf::from)
}

const NETWATCH_CONFIG: &str = "NETWATCH_CONFIG";

const DEFAULT_CONFIG: &str = "./netwatch.json";

pub fn get_config_path() -> String {
    std::env::var(NETWATCH_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG.to_string())
}

/// Convert a timestamp to Unix milliseconds for storage
pub fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp
pub fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Mean of a slice, `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation, `None` when empty.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}
