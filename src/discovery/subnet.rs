use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use super::DiscoveryError;

/// Widest prefix a ping sweep will walk. Larger subnets are clipped to the
/// first /20 block (4094 hosts).
pub const MIN_SWEEP_PREFIX: u8 = 20;

/// An IPv4 network in CIDR notation, normalised to its network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Subnet {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, DiscoveryError> {
        if prefix > 32 {
            return Err(DiscoveryError::InvalidSubnet(format!("{addr}/{prefix}")));
        }
        Ok(Self {
            network: Ipv4Addr::from(u32::from(addr) & Self::mask(prefix)),
            prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        match prefix {
            0 => 0,
            p => u32::MAX << (32 - p as u32),
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask(self.prefix) == u32::from(self.network)
    }

    /// Whether [`Ipv4Subnet::hosts`] covers only part of this subnet
    pub fn is_clipped(&self) -> bool {
        self.prefix < MIN_SWEEP_PREFIX
    }

    /// Host addresses to sweep, network and broadcast excluded.
    ///
    /// /31 and /32 have no network or broadcast address and yield every
    /// address.
    pub fn hosts(&self) -> Vec<Ipv4Addr> {
        let prefix = self.prefix.max(MIN_SWEEP_PREFIX);
        let base = u32::from(self.network);
        let size = 1u32 << (32 - prefix as u32);

        if size <= 2 {
            return (0..size).map(|offset| Ipv4Addr::from(base + offset)).collect();
        }

        (1..size - 1)
            .map(|offset| Ipv4Addr::from(base + offset))
            .collect()
    }
}

impl FromStr for Ipv4Subnet {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DiscoveryError::InvalidSubnet(s.to_string());

        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;

        Self::new(addr, prefix)
    }
}

impl fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}
