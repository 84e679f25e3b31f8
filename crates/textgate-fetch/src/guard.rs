//! SSRF target policy: blocked address ranges and hostnames.
//!
//! # Invariants
//! - The policy is immutable after startup and shared by reference into
//!   every fetch; it is never mutated at request time.
//! - Address checks run on *resolved* addresses, after DNS, so a
//!   public-looking hostname rebinding to an internal address is caught.
//! - IPv4-mapped IPv6 addresses are unwrapped before matching, closing
//!   the `::ffff:127.0.0.1` bypass.

use std::collections::HashSet;
use std::net::IpAddr;

/// One CIDR block, either family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix: u8,
}

impl CidrRange {
    /// Parse `"10.0.0.0/8"` / `"fc00::/7"`. A bare address is a host
    /// route (`/32` or `/128`).
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        let (addr_part, prefix_part) = match s.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (s, None),
        };
        let network: IpAddr = addr_part
            .trim()
            .parse()
            .map_err(|_| PolicyError::BadRange(s.to_string()))?;
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix = match prefix_part {
            Some(p) => p
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|&p| p <= max)
                .ok_or_else(|| PolicyError::BadRange(s.to_string()))?,
            None => max,
        };
        Ok(Self { network, prefix })
    }

    /// Whether `ip` falls inside this block.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, unmap(ip)) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_v4(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_v6(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

/// Unwrap IPv4-mapped IPv6 so v4 ranges apply to it.
fn unmap(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => ip,
        },
        IpAddr::V4(_) => ip,
    }
}

fn prefix_mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

/// Configuration-time policy errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid blocked range: {0}")]
    BadRange(String),
}

/// Immutable fetch-target policy, loaded once at startup.
#[derive(Debug, Clone)]
pub struct SsrfPolicy {
    ranges: Vec<CidrRange>,
    hosts: HashSet<String>,
}

impl SsrfPolicy {
    /// Build from configured range and hostname lists.
    pub fn new(ranges: &[String], hosts: &[String]) -> Result<Self, PolicyError> {
        let ranges = ranges
            .iter()
            .map(|s| CidrRange::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        let hosts = hosts.iter().map(|h| h.to_ascii_lowercase()).collect();
        Ok(Self { ranges, hosts })
    }

    /// The default blocklist: loopback, RFC1918, link-local (covering the
    /// cloud metadata service), CGNAT, unspecified, and the IPv6
    /// equivalents.
    #[must_use]
    pub fn default_ranges() -> Vec<String> {
        [
            "127.0.0.0/8",
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "169.254.0.0/16",
            "100.64.0.0/10",
            "0.0.0.0/8",
            "::1/128",
            "::/128",
            "fc00::/7",
            "fe80::/10",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
    }

    /// Whether a resolved address is blocked.
    #[must_use]
    pub fn blocks_ip(&self, ip: IpAddr) -> bool {
        self.ranges.iter().any(|r| r.contains(ip))
    }

    /// Whether a hostname is on the blocklist (exact, case-insensitive).
    #[must_use]
    pub fn blocks_host(&self, host: &str) -> bool {
        self.hosts.contains(&host.to_ascii_lowercase())
    }
}

impl Default for SsrfPolicy {
    fn default() -> Self {
        Self::new(&Self::default_ranges(), &[])
            .unwrap_or_else(|_| unreachable!("builtin ranges parse"))
    }
}
