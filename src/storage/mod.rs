//! Durable storage for monitoring sessions
//!
//! ## Design
//!
//! - **Trait-based**: the scheduler and insight engine only see
//!   [`MonitorStore`], so tests can wrap or replace the backend
//! - **Async**: every call is awaited from tokio tasks
//! - **Single writer**: writes are serialized and transactional
//!
//! ## Usage
//!
//! ```no_run
//! use netwatch::storage::{MonitorStore, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::open("./netwatch.db").await?;
//!     let session = store.start_session(Some("manual run")).await?;
//!     store.end_session(session).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::{MonitorStore, TimeWindow};
pub use error::{StorageError, StorageResult};
pub use schema::{
    CleanupStats, Deactivation, DeviceRow, FlushBatch, HourlyAggregate, PendingQualityTest, QualityTest,
    QualityTestRow, SessionSummary, SnapshotRow,
};
pub use sqlite::SqliteStore;
