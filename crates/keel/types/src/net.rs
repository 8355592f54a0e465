//! IPv4 address ranges

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IpRangeError {
    #[error("missing '/' in CIDR {0:?}")]
    MissingPrefix(String),

    #[error("invalid address in CIDR {0:?}")]
    InvalidAddress(String),

    #[error("invalid prefix length in CIDR {0:?}")]
    InvalidPrefix(String),
}

/// A CIDR block such as `10.0.0.0/24`.
///
/// The network address is always normalised (host bits cleared).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl IpRange {
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, IpRangeError> {
        if prefix_len > 32 {
            return Err(IpRangeError::InvalidPrefix(format!("{}/{}", addr, prefix_len)));
        }
        let network = Ipv4Addr::from(u32::from(addr) & Self::mask(prefix_len));
        Ok(Self {
            network,
            prefix_len,
        })
    }

    fn mask(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len)
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Number of addresses in the block, network and broadcast included.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & Self::mask(self.prefix_len) == u32::from(self.network)
    }

    /// The address at `offset` from the network address.
    pub fn nth(&self, offset: u64) -> Option<Ipv4Addr> {
        if offset >= self.size() {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.network) + offset as u32))
    }

    /// Offset of `ip` within the block.
    pub fn offset_of(&self, ip: Ipv4Addr) -> Option<u64> {
        self.contains(ip)
            .then(|| u64::from(u32::from(ip) - u32::from(self.network)))
    }
}

impl FromStr for IpRange {
    type Err = IpRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| IpRangeError::MissingPrefix(s.to_string()))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| IpRangeError::InvalidAddress(s.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| IpRangeError::InvalidPrefix(s.to_string()))?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl Serialize for IpRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalises_network() {
        let range: IpRange = "10.0.0.17/24".parse().unwrap();
        assert_eq!(range.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(range.to_string(), "10.0.0.0/24");
        assert_eq!(range.size(), 256);
    }

    #[test]
    fn test_contains_and_offsets() {
        let range: IpRange = "172.16.0.0/16".parse().unwrap();
        assert!(range.contains(Ipv4Addr::new(172, 16, 200, 1)));
        assert!(!range.contains(Ipv4Addr::new(172, 17, 0, 1)));
        assert_eq!(range.nth(1), Some(Ipv4Addr::new(172, 16, 0, 1)));
        assert_eq!(range.nth(65536), None);
        assert_eq!(range.offset_of(Ipv4Addr::new(172, 16, 1, 0)), Some(256));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "10.0.0.0".parse::<IpRange>(),
            Err(IpRangeError::MissingPrefix(_))
        ));
        assert!(matches!(
            "10.0.0/8".parse::<IpRange>(),
            Err(IpRangeError::InvalidAddress(_))
        ));
        assert!(matches!(
            "10.0.0.0/33".parse::<IpRange>(),
            Err(IpRangeError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_zero_prefix_covers_everything() {
        let range: IpRange = "0.0.0.0/0".parse().unwrap();
        assert!(range.contains(Ipv4Addr::new(8, 8, 8, 8)));
        assert_eq!(range.size(), 1u64 << 32);
    }
}
