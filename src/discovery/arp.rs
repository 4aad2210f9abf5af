//! Neighbor table readers
//!
//! Two formats are understood:
//!
//! - Linux `/proc/net/arp`:
//!   `192.168.1.1  0x1  0x2  aa:bb:cc:dd:ee:ff  *  eth0`
//! - BSD/macOS style `arp -a`:
//!   `router.lan (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]`
//!
//! Lines that do not parse are skipped. Incomplete entries are dropped and
//! the all-zero MAC is reported as unresolved.

use std::net::IpAddr;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{DiscoveryError, Neighbor, NeighborSource};
use crate::MacAddr;

const PROC_NET_ARP: &str = "/proc/net/arp";

/// `ATF_COM`: the kernel has a resolved hardware address for the entry
const ATF_COM: u32 = 0x2;

static ARP_LINE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)\s+\(([0-9A-Fa-f.:]+)\)\s+at\s+(\S+)")
});

fn resolved_mac(raw: &str) -> Option<MacAddr> {
    raw.parse::<MacAddr>().ok().filter(|mac| !mac.is_unspecified())
}

/// Parse the contents of `/proc/net/arp`.
pub fn parse_proc_net_arp(contents: &str) -> Vec<Neighbor> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 4 {
                trace!("skipping short arp line: {line:?}");
                return None;
            }

            let ip: IpAddr = columns[0].parse().ok()?;
            let flags = u32::from_str_radix(columns[2].trim_start_matches("0x"), 16).ok()?;
            if flags & ATF_COM == 0 {
                return None;
            }

            Some(Neighbor {
                ip,
                mac: resolved_mac(columns[3]),
                hostname: None,
            })
        })
        .collect()
}

/// Parse the output of `arp -a`.
pub fn parse_arp_output(output: &str) -> Vec<Neighbor> {
    let Ok(pattern) = ARP_LINE.as_ref() else {
        return Vec::new();
    };

    output
        .lines()
        .filter_map(|line| {
            let captures = pattern.captures(line)?;
            let ip: IpAddr = captures.get(2)?.as_str().parse().ok()?;

            let mac_field = captures.get(3)?.as_str();
            if mac_field.contains("incomplete") {
                return None;
            }

            let hostname = captures
                .get(1)
                .map(|m| m.as_str())
                .filter(|name| *name != "?")
                .map(str::to_string);

            Some(Neighbor {
                ip,
                mac: resolved_mac(mac_field),
                hostname,
            })
        })
        .collect()
}

/// Reads the host's neighbor table: `/proc/net/arp` where present,
/// otherwise the output of `arp -a`.
#[derive(Debug, Clone, Default)]
pub struct SystemNeighbors;

#[async_trait]
impl NeighborSource for SystemNeighbors {
    async fn neighbors(&self) -> Result<Vec<Neighbor>, DiscoveryError> {
        match tokio::fs::read_to_string(PROC_NET_ARP).await {
            Ok(contents) => return Ok(parse_proc_net_arp(&contents)),
            Err(e) => debug!("{PROC_NET_ARP} unavailable ({e}), falling back to arp -a"),
        }

        let output = Command::new("arp")
            .arg("-a")
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(DiscoveryError::CommandFailed(format!(
                "arp -a exited with {}",
                output.status
            )));
        }

        Ok(parse_arp_output(&String::from_utf8_lossy(&output.stdout)))
    }
}
