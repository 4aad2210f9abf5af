//! Task-based monitoring core
//!
//! One run of the monitor is three tokio tasks sharing state behind narrow
//! locks. None of them holds a lock across a probe or a database call.
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │ MonitorService  │
//!                    └────────┬────────┘
//!                             │ spawns
//!            ┌────────────────┼────────────────┐
//!            │                │                │
//!    ┌───────▼───────┐ ┌──────▼──────┐ ┌───────▼───────┐
//!    │SchedulerActor │ │ FlushActor  │ │DiscoveryActor │
//!    │ (every tick)  │ │(every flush)│ │ (every pass)  │
//!    └───────┬───────┘ └──────┬──────┘ └───────┬───────┘
//!            │ record         │ take_batch     │ merge
//!    ┌───────▼────────────────▼──────┐ ┌───────▼───────┐
//!    │        SnapshotBuffer         │ │DeviceRegistry │
//!    └───────────────────────────────┘ └───────────────┘
//! ```
//!
//! ## Cancellation
//!
//! A `watch<bool>` flag. The scheduler checks it at the start of every tick
//! and between the bandwidth sample and the probe; sleeping tasks wake on
//! the change. [`MonitorHandle::shutdown`] waits for all three tasks before
//! the final flush, so no tick is half applied.

pub mod buffer;
pub mod discoverer;
pub mod flusher;
pub mod messages;
pub mod registry;
pub mod rotation;
pub mod scheduler;
pub mod service;

use std::fmt;

pub use buffer::SnapshotBuffer;
pub use messages::{MonitorReport, MonitorStats};
pub use registry::{DeviceRegistry, MergeOutcome, TrackedDevice};
pub use rotation::Rotation;
pub use service::{MonitorHandle, MonitorReader, MonitorService};

use crate::monitors::ProbeError;
use crate::storage::StorageError;

/// Errors that stop the monitor from starting or from closing its session.
///
/// Everything that can go wrong while running is logged and counted in
/// [`MonitorStats`] instead.
#[derive(Debug)]
pub enum MonitorError {
    /// Rejected by `MonitorConfig::validate` or an unparsable subnet
    Config(String),
    /// The first counter sample failed
    NoUsableInterface(ProbeError),
    Storage(StorageError),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Config(msg) => write!(f, "Invalid monitor configuration: {msg}"),
            MonitorError::NoUsableInterface(e) => write!(f, "No usable network interface: {e}"),
            MonitorError::Storage(e) => write!(f, "Storage error: {e}"),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::NoUsableInterface(e) => Some(e),
            MonitorError::Storage(e) => Some(e),
            MonitorError::Config(_) => None,
        }
    }
}

impl From<StorageError> for MonitorError {
    fn from(err: StorageError) -> Self {
        MonitorError::Storage(err)
    }
}
