//! Reverse name lookup for discovered addresses
//!
//! The Linux neighbor table and sweep responders carry no names, so
//! discovery asks a [`HostResolver`] for the ones still missing. Lookups
//! are best effort: a failure or timeout leaves the hostname unset.

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Name registered for `ip`, if any.
    async fn reverse(&self, ip: IpAddr) -> Option<String>;
}

/// Resolves through the system's name service switch with `getent hosts`,
/// so `/etc/hosts`, mDNS and DNS are consulted as the host is configured.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn reverse(&self, ip: IpAddr) -> Option<String> {
        let output = match Command::new("getent")
            .arg("hosts")
            .arg(ip.to_string())
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                trace!("getent unavailable: {e}");
                return None;
            }
        };

        // exit status 2: no entry for the address
        if !output.status.success() {
            return None;
        }
        parse_getent_hosts(&String::from_utf8_lossy(&output.stdout), ip)
    }
}

/// First name of a `getent hosts` line, e.g.
/// `192.168.1.20    printer.lan printer`.
pub fn parse_getent_hosts(output: &str, ip: IpAddr) -> Option<String> {
    output.lines().find_map(|line| {
        let mut columns = line.split_whitespace();
        let address: IpAddr = columns.next()?.parse().ok()?;
        if address != ip {
            return None;
        }
        columns
            .next()
            .filter(|name| name.parse::<IpAddr>().is_err())
            .map(|name| name.trim_end_matches('.').to_string())
    })
}
