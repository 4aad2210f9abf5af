//! MonitorService - owns one monitoring run
//!
//! `MonitorService::start` performs the fatal startup checks, opens the
//! session and spawns the three tasks. Everything they share lives in
//! [`Shared`], each piece behind its own lock:
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │ Shared                       │
//!   Scheduler ───▶│  registry  (devices, cursor) │◀─── Discoverer
//!       │         │  buffer    (accumulator)     │
//!       └────────▶│  stats                       │◀─── Flusher ──▶ MonitorStore
//!                 └──────────────────────────────┘
//!                                ▲
//!                      MonitorReader (display)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use super::MonitorError;
use super::buffer::SnapshotBuffer;
use super::discoverer::{DiscoveryActor, discovery_pass};
use super::flusher::{FlushActor, flush};
use super::messages::{MonitorReport, MonitorStats};
use super::registry::{DeviceRegistry, TrackedDevice};
use super::scheduler::SchedulerActor;
use crate::config::{Config, MonitorConfig};
use crate::discovery::{DeviceDiscovery, HostResolver, NeighborSource};
use crate::monitors::{Probe, ProbeEngine};
use crate::storage::MonitorStore;
use crate::{DeviceKey, NetworkSnapshot};

/// State shared by the tasks of one run.
pub(crate) struct Shared {
    pub(crate) config: MonitorConfig,
    pub(crate) retention_days: Option<u32>,
    pub(crate) session_id: i64,
    pub(crate) store: Arc<dyn MonitorStore>,
    pub(crate) registry: Mutex<DeviceRegistry>,
    pub(crate) buffer: Mutex<SnapshotBuffer>,
    pub(crate) stats: Mutex<MonitorStats>,
    /// Serializes flushes
    pub(crate) flush_lock: Mutex<()>,
}

/// A configured but not yet running monitor.
pub struct MonitorService {
    config: Config,
    store: Arc<dyn MonitorStore>,
    probe: Arc<dyn Probe>,
    neighbors: Arc<dyn NeighborSource>,
    resolver: Option<Arc<dyn HostResolver>>,
    note: Option<String>,
}

impl MonitorService {
    pub fn new(
        config: Config,
        store: Arc<dyn MonitorStore>,
        probe: Arc<dyn Probe>,
        neighbors: Arc<dyn NeighborSource>,
    ) -> Self {
        Self {
            config,
            store,
            probe,
            neighbors,
            resolver: None,
            note: None,
        }
    }

    /// Free-text note stored with the session
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Reverse-resolve devices discovered without a hostname
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Check the configuration and the network, open a session, run a
    /// first discovery pass and spawn the monitor tasks.
    ///
    /// Nothing is written to the store unless the configuration is valid and
    /// a first counter sample succeeded.
    #[instrument(skip(self))]
    pub async fn start(self) -> Result<MonitorHandle, MonitorError> {
        let Self {
            config,
            store,
            probe,
            neighbors,
            resolver,
            note,
        } = self;
        let monitor = config.monitor;

        monitor.validate().map_err(MonitorError::Config)?;
        config.insights.validate().map_err(MonitorError::Config)?;

        let engine = ProbeEngine::new(probe.clone(), monitor.probe_timeout, monitor.probe_samples);
        let mut discovery =
            DeviceDiscovery::new(&config.discovery, neighbors, probe, monitor.probe_timeout)
                .map_err(|e| MonitorError::Config(e.to_string()))?;
        if let Some(resolver) = resolver {
            discovery = discovery.with_resolver(resolver);
        }

        let initial = engine
            .sample_bandwidth()
            .await
            .map_err(MonitorError::NoUsableInterface)?;
        info!("sampling interfaces: {}", initial.interfaces.join(", "));

        if let Some(stale) = store.open_session().await? {
            warn!("session #{stale} was left open by a previous run, closing it");
            store.end_session(stale).await?;
        }
        let session_id = store.start_session(note.as_deref()).await?;
        info!("started session #{session_id}");

        let shared = Arc::new(Shared {
            retention_days: config.database.retention_days,
            session_id,
            store,
            registry: Mutex::new(DeviceRegistry::new()),
            buffer: Mutex::new(SnapshotBuffer::new(monitor.max_buffered_snapshots)),
            stats: Mutex::new(MonitorStats::default()),
            flush_lock: Mutex::new(()),
            config: monitor,
        });

        let found = discovery_pass(&shared, &discovery).await;
        info!("initial discovery found {found} devices");

        let (cancel_tx, cancel_rx) = watch::channel(false);

        let tasks = vec![
            tokio::spawn(
                SchedulerActor::new(shared.clone(), engine, cancel_rx.clone(), Some(initial)).run(),
            ),
            tokio::spawn(FlushActor::new(shared.clone(), cancel_rx.clone()).run()),
            tokio::spawn(DiscoveryActor::new(shared.clone(), discovery, cancel_rx).run()),
        ];

        Ok(MonitorHandle {
            reader: MonitorReader { shared },
            cancel_tx,
            tasks,
            started: Instant::now(),
        })
    }
}

/// Read access to a running monitor. Cheap to clone into display tasks.
#[derive(Clone)]
pub struct MonitorReader {
    shared: Arc<Shared>,
}

impl MonitorReader {
    pub fn session_id(&self) -> i64 {
        self.shared.session_id
    }

    /// Copy of the most recent snapshot, `None` before the first tick.
    pub async fn current_snapshot(&self) -> Option<NetworkSnapshot> {
        self.shared.buffer.lock().await.latest()
    }

    pub async fn stats(&self) -> MonitorStats {
        let mut stats = self.shared.stats.lock().await.clone();

        {
            let buffer = self.shared.buffer.lock().await;
            stats.buffered_snapshots = buffer.buffered_snapshots();
            stats.snapshots_dropped += buffer.dropped();
        }

        let registry = self.shared.registry.lock().await;
        stats.rotation_len = registry.rotation_len();
        stats.known_devices = registry.known_count();
        stats
    }

    /// All known devices, dormant ones included, ordered by address
    pub async fn devices(&self) -> Vec<TrackedDevice> {
        self.shared.registry.lock().await.devices()
    }

    /// Active devices in the order they will be probed
    pub async fn rotation_order(&self) -> Vec<DeviceKey> {
        self.shared.registry.lock().await.rotation_order()
    }
}

/// Owner of a running monitor.
///
/// Dropping the handle stops the tasks without the final flush; the session
/// then stays open until the next start closes it.
pub struct MonitorHandle {
    reader: MonitorReader,
    cancel_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    started: Instant,
}

impl fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("session_id", &self.session_id())
            .field("tasks", &self.tasks.len())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl MonitorHandle {
    pub fn reader(&self) -> MonitorReader {
        self.reader.clone()
    }

    pub fn session_id(&self) -> i64 {
        self.reader.session_id()
    }

    pub async fn current_snapshot(&self) -> Option<NetworkSnapshot> {
        self.reader.current_snapshot().await
    }

    pub async fn stats(&self) -> MonitorStats {
        self.reader.stats().await
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Flush the accumulator now instead of waiting for the next interval.
    /// Returns `false` if the write failed.
    pub async fn flush_now(&self) -> bool {
        flush(&self.reader.shared).await
    }

    /// Stop the tasks, wait for the tick in flight, flush what is buffered
    /// and close the session.
    ///
    /// A failed final flush does not prevent the session from closing; the
    /// report says how many snapshots were lost.
    #[instrument(skip(self), fields(session = self.session_id()))]
    pub async fn shutdown(self) -> Result<MonitorReport, MonitorError> {
        info!("shutting down monitor");

        // Every task holds a receiver until it returns, so this only fails
        // if they are all gone already.
        let _ = self.cancel_tx.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                error!("monitor task ended abnormally: {e}");
            }
        }

        let shared = &self.reader.shared;
        if !flush(shared).await {
            warn!("final flush failed");
        }
        let unflushed_snapshots = shared.buffer.lock().await.buffered_snapshots();

        let session = shared.store.end_session(shared.session_id).await?;
        let stats = self.reader.stats().await;

        info!(
            "session #{} closed: {} snapshots, {} probes, {} flush failures",
            session.id, session.total_snapshots, stats.probes, stats.flush_failures
        );

        Ok(MonitorReport {
            session,
            stats,
            unflushed_snapshots,
            uptime: self.started.elapsed(),
        })
    }
}
