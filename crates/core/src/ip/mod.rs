//! IP entries and allow/deny lists
//!
//! An [`IpEntry`] is either a host address (`193.70.18.123`) or a subnet in
//! CIDR notation (`193.70.18.0/24`), IPv4 or IPv6. Entries keep the string
//! they were created from. List identity (dedup, delete, has) and host
//! conformance are exact string equality; only subnet containment works on
//! parsed addresses.

mod list;

pub use list::{IpList, MemoryIpList};

use crate::{CoreError, Result};
use ipnetwork::IpNetwork;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

/// Validated host or subnet address
#[derive(Debug, Clone)]
pub struct IpEntry {
    raw: String,
    network: IpNetwork,
    masked: bool,
}

impl IpEntry {
    /// Parse a host address or a CIDR subnet
    ///
    /// # Errors
    /// - `MissingField` for an empty string
    /// - `InvalidIp` if the value is neither a host address nor valid CIDR
    pub fn parse(ip: &str) -> Result<Self> {
        if ip.is_empty() {
            return Err(CoreError::MissingField("ip"));
        }

        if ip.contains('/') {
            let network: IpNetwork = ip.parse().map_err(|e| CoreError::invalid_ip(ip, e))?;
            return Ok(Self {
                raw: ip.to_string(),
                network,
                masked: true,
            });
        }

        let addr: IpAddr = ip.parse().map_err(|e| CoreError::invalid_ip(ip, e))?;
        Ok(Self {
            raw: ip.to_string(),
            network: IpNetwork::from(addr),
            masked: false,
        })
    }

    /// Parse a host address, rejecting a mask part
    pub fn parse_host(ip: &str) -> Result<Self> {
        if ip.contains('/') {
            return Err(CoreError::MaskNotAllowed(ip.to_string()));
        }
        Self::parse(ip)
    }

    /// The value exactly as given
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn has_mask(&self) -> bool {
        self.masked
    }

    /// Address part (without mask)
    pub fn addr(&self) -> IpAddr {
        self.network.ip()
    }

    /// Prefix length, for subnet entries
    pub fn prefix(&self) -> Option<u8> {
        self.masked.then(|| self.network.prefix())
    }

    /// Does this subnet entry contain `host`?
    ///
    /// Host entries contain nothing, masked queries are never contained,
    /// and families never mix.
    pub fn contains(&self, host: &IpEntry) -> bool {
        if !self.masked || host.masked {
            return false;
        }
        subnet_contains(self.network, host.addr())
    }

    /// Conformance of a host query against this entry: the exact same value
    /// for a host entry, containment for a subnet entry
    pub fn matches(&self, host: &IpEntry) -> bool {
        if host.masked {
            return false;
        }
        if self.masked {
            self.contains(host)
        } else {
            self.raw == host.raw
        }
    }
}

/// Compare the network bits of `addr` with those of `network`
fn subnet_contains(network: IpNetwork, addr: IpAddr) -> bool {
    match (network, addr) {
        (IpNetwork::V4(net), IpAddr::V4(ip)) => {
            let mask = u32::from(net.mask());
            u32::from(net.ip()) & mask == u32::from(ip) & mask
        }
        (IpNetwork::V6(net), IpAddr::V6(ip)) => {
            let mask = u128::from(net.mask());
            u128::from(net.ip()) & mask == u128::from(ip) & mask
        }
        _ => false,
    }
}

impl PartialEq for IpEntry {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for IpEntry {}

impl Hash for IpEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for IpEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for IpEntry {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(s: &str) -> IpEntry {
        IpEntry::parse(s).unwrap()
    }

    #[test]
    fn test_parse_host() {
        let ip = entry("127.0.0.1");
        assert!(!ip.has_mask());
        assert_eq!(ip.as_str(), "127.0.0.1");
        assert_eq!(ip.prefix(), None);
        assert_eq!(ip.addr(), "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_parse_subnet() {
        let ip = entry("127.0.0.0/24");
        assert!(ip.has_mask());
        assert_eq!(ip.prefix(), Some(24));
        assert_eq!(ip.addr(), "127.0.0.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["127.0.0", "127.0.0.256", "localhost", "127.0.0.0/33", "::1/129", "1.2.3.4/x"] {
            assert!(
                matches!(IpEntry::parse(bad), Err(CoreError::InvalidIp { .. })),
                "`{}` should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(IpEntry::parse(""), Err(CoreError::MissingField("ip"))));
    }

    #[test]
    fn test_parse_host_rejects_mask() {
        let result = IpEntry::parse_host("127.0.0.0/24");
        assert!(matches!(result, Err(CoreError::MaskNotAllowed(_))));
    }

    #[test]
    fn test_ipv4_subnet_contains() {
        let subnet = entry("127.0.0.0/24");
        for (ip, expected) in [
            ("127.0.0.1", true),
            ("127.0.0.50", true),
            ("127.0.0.255", true),
            ("128.0.0.3", false),
            ("127.0.1.1", false),
        ] {
            assert_eq!(subnet.contains(&entry(ip)), expected, "{}", ip);
        }
    }

    #[test]
    fn test_ipv6_subnet_contains() {
        let subnet = entry("2001:DB8:0:1234::/64");
        assert!(subnet.contains(&entry("2001:DB8:0:1234::2")));
        assert!(subnet.contains(&entry("2001:db8:0:1234::ffff")));
        assert!(!subnet.contains(&entry("2001:DB8:0:1235::2")));
    }

    #[test]
    fn test_subnet_with_host_bits_set() {
        // Host bits in the entry are ignored by the mask
        let subnet = entry("10.1.2.3/16");
        assert!(subnet.contains(&entry("10.1.200.7")));
        assert!(!subnet.contains(&entry("10.2.0.1")));
    }

    #[test]
    fn test_prefix_edges() {
        assert!(entry("0.0.0.0/0").contains(&entry("203.0.113.9")));
        assert!(entry("::/0").contains(&entry("2001:db8::1")));
        assert!(entry("192.0.2.7/32").contains(&entry("192.0.2.7")));
        assert!(!entry("192.0.2.7/32").contains(&entry("192.0.2.8")));
        assert!(entry("2001:db8::1/128").contains(&entry("2001:db8::1")));
    }

    #[test]
    fn test_families_never_mix() {
        assert!(!entry("0.0.0.0/0").contains(&entry("::1")));
        assert!(!entry("::/0").contains(&entry("127.0.0.1")));
        // IPv4-mapped IPv6 stays IPv6
        assert!(!entry("192.168.0.0/16").contains(&entry("::ffff:192.168.1.1")));
    }

    #[test]
    fn test_dotted_quad_ipv6_subnet() {
        let subnet = entry("::ffff:192.168.0.0/112");
        assert!(subnet.contains(&entry("::ffff:192.168.7.9")));
        assert!(!subnet.contains(&entry("::ffff:192.169.0.1")));
    }

    #[test]
    fn test_host_entry_contains_nothing() {
        assert!(!entry("127.0.0.1").contains(&entry("127.0.0.1")));
    }

    #[test]
    fn test_matches() {
        let host = entry("2001:db8::1");
        assert!(host.matches(&entry("2001:db8::1")));
        assert!(!host.matches(&entry("2001:db8::2")));

        let subnet = entry("10.0.0.0/8");
        assert!(subnet.matches(&entry("10.9.9.9")));
        assert!(!subnet.matches(&entry("10.0.0.0/8")));
    }

    #[test]
    fn test_host_match_is_not_normalized() {
        let host = entry("::1");
        assert!(!host.matches(&entry("0:0:0:0:0:0:0:1")));
        assert!(!host.matches(&entry("0::1")));
        assert!(!entry("2001:db8::1").matches(&entry("2001:DB8::1")));
    }

    #[test]
    fn test_equality_is_textual() {
        assert_eq!(entry("10.0.0.0/8"), entry("10.0.0.0/8"));
        assert_ne!(entry("2001:db8::1"), entry("2001:DB8::1"));
        assert_ne!(entry("10.0.0.0/8"), entry("10.0.0.0"));
    }
}
