//! Device discovery: neighbor table plus an optional ping sweep.
//!
//! A pass never fails. An unreadable neighbor table is logged and treated
//! as empty; hosts that do not answer the sweep are skipped. Devices still
//! without a name after the merge get a reverse lookup when a
//! [`HostResolver`] is set.

pub mod arp;
pub mod resolve;
pub mod subnet;

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

pub use arp::SystemNeighbors;
pub use resolve::{HostResolver, SystemResolver};
pub use subnet::Ipv4Subnet;

use crate::MacAddr;
use crate::config::DiscoveryConfig;
use crate::monitors::Probe;

/// Upper bound for one reverse lookup
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors from a neighbor source. Never fatal to the monitor.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Reading the table or spawning the helper failed (permission denied, ...)
    Io(std::io::Error),

    /// The helper command ran but reported failure
    CommandFailed(String),

    /// A configured subnet is not valid IPv4 CIDR
    InvalidSubnet(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::Io(err) => write!(f, "neighbor table unavailable: {err}"),
            DiscoveryError::CommandFailed(msg) => write!(f, "neighbor lookup failed: {msg}"),
            DiscoveryError::InvalidSubnet(raw) => write!(f, "invalid IPv4 subnet: {raw}"),
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::Io(err)
    }
}

/// One reachable host as reported by a discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub ip: IpAddr,
    /// `None` when the neighbor table has no resolved hardware address
    pub mac: Option<MacAddr>,
    pub hostname: Option<String>,
}

/// Read-only view of the host's neighbor (ARP/NDP) table.
#[async_trait]
pub trait NeighborSource: Send + Sync {
    async fn neighbors(&self) -> Result<Vec<Neighbor>, DiscoveryError>;
}

pub struct DeviceDiscovery {
    neighbors: Arc<dyn NeighborSource>,
    probe: Arc<dyn Probe>,
    resolver: Option<Arc<dyn HostResolver>>,
    subnet: Option<Ipv4Subnet>,
    sweep: bool,
    concurrency: usize,
    echo_timeout: Duration,
}

impl DeviceDiscovery {
    /// Fails only on an unparsable `discovery.subnet`.
    pub fn new(
        config: &DiscoveryConfig,
        neighbors: Arc<dyn NeighborSource>,
        probe: Arc<dyn Probe>,
        echo_timeout: Duration,
    ) -> Result<Self, DiscoveryError> {
        let subnet = config
            .subnet
            .as_deref()
            .map(str::parse::<Ipv4Subnet>)
            .transpose()?;

        if let Some(subnet) = subnet.filter(|s| s.is_clipped()) {
            warn!(
                "subnet {subnet} is wider than /{}, the sweep covers its first block only",
                subnet::MIN_SWEEP_PREFIX
            );
        }

        Ok(Self {
            neighbors,
            probe,
            resolver: None,
            subnet,
            sweep: config.sweep,
            concurrency: config.sweep_concurrency.max(1),
            echo_timeout,
        })
    }

    /// Look up names for devices the neighbor table reports without one.
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Current set of reachable devices, deduplicated by IP and ordered by
    /// address.
    ///
    /// Neighbor table entries win over sweep responders for the same IP, as
    /// only the table knows MACs. Names come from the table or, failing
    /// that, the resolver.
    #[instrument(skip(self))]
    pub async fn discover(&self) -> Vec<Neighbor> {
        let mut found: BTreeMap<IpAddr, Neighbor> = BTreeMap::new();

        if let Some(subnet) = self.subnet.filter(|_| self.sweep) {
            for ip in self.sweep_subnet(subnet).await {
                found.insert(
                    ip,
                    Neighbor {
                        ip,
                        mac: None,
                        hostname: None,
                    },
                );
            }
        }

        match self.neighbors.neighbors().await {
            Ok(entries) => {
                for entry in entries {
                    if self
                        .subnet
                        .is_some_and(|s| !matches!(entry.ip, IpAddr::V4(v4) if s.contains(v4)))
                    {
                        continue;
                    }
                    found.insert(entry.ip, entry);
                }
            }
            Err(e) => warn!("skipping neighbor table: {e}"),
        }

        let mut found: Vec<Neighbor> = found.into_values().collect();
        if let Some(resolver) = &self.resolver {
            self.fill_hostnames(resolver, &mut found).await;
        }

        info!("discovery pass found {} devices", found.len());
        found
    }

    /// Reverse-resolve every unnamed device, `concurrency` at a time.
    async fn fill_hostnames(&self, resolver: &Arc<dyn HostResolver>, found: &mut [Neighbor]) {
        let unnamed: Vec<(usize, IpAddr)> = found
            .iter()
            .enumerate()
            .filter(|(_, n)| n.hostname.is_none())
            .map(|(i, n)| (i, n.ip))
            .collect();
        if unnamed.is_empty() {
            return;
        }

        let names: Vec<(usize, String)> = stream::iter(unnamed)
            .map(|(i, ip)| {
                let resolver = Arc::clone(resolver);
                async move {
                    match tokio::time::timeout(LOOKUP_TIMEOUT, resolver.reverse(ip)).await {
                        Ok(name) => name.map(|name| (i, name)),
                        Err(_) => {
                            debug!("reverse lookup of {ip} timed out");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|named| async move { named })
            .collect()
            .await;

        debug!("resolved {} hostnames", names.len());
        for (i, name) in names {
            found[i].hostname = Some(name);
        }
    }

    /// Echo every host of `subnet` once, `concurrency` at a time.
    async fn sweep_subnet(&self, subnet: Ipv4Subnet) -> Vec<IpAddr> {
        let hosts = subnet.hosts();
        debug!("sweeping {} hosts of {subnet}", hosts.len());

        let responders: Vec<IpAddr> = stream::iter(hosts)
            .map(|host: Ipv4Addr| {
                let probe = Arc::clone(&self.probe);
                let timeout = self.echo_timeout;
                async move {
                    let ip = IpAddr::V4(host);
                    match tokio::time::timeout(timeout, probe.echo(ip, timeout)).await {
                        Ok(Ok(Some(_))) => Some(ip),
                        _ => None,
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|ip| async move { ip })
            .collect()
            .await;

        debug!("{} hosts answered the sweep", responders.len());
        responders
    }
}
