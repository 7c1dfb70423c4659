//! Address model for lease pools
//!
//! Provides:
//! - The three address families a pool can manage (IPv4, IPv6, MAC)
//! - Offset arithmetic so any address is derivable from a range base
//! - Parsing and display of the textual forms

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Address family of a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddrKind {
    Ipv4,
    Ipv6,
    Mac,
}

impl fmt::Display for AddrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrKind::Ipv4 => write!(f, "IP4"),
            AddrKind::Ipv6 => write!(f, "IP6"),
            AddrKind::Mac => write!(f, "ETHER"),
        }
    }
}

impl FromStr for AddrKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IP4" | "IPV4" => Ok(AddrKind::Ipv4),
            "IP6" | "IPV6" => Ok(AddrKind::Ipv6),
            "ETHER" | "MAC" => Ok(AddrKind::Mac),
            other => Err(Error::InvalidAddrKind(other.to_string())),
        }
    }
}

/// 48-bit MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(u64);

const MAC_MAX: u64 = 0xffff_ffff_ffff;

impl MacAddr {
    /// Build a MAC from its 48-bit numeric value
    pub fn new(value: u64) -> Option<Self> {
        (value <= MAC_MAX).then_some(Self(value))
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != 6 {
            return Err(Error::InvalidAddress(s.to_string()));
        }

        let mut value: u64 = 0;
        for octet in octets {
            if octet.len() != 2 {
                return Err(Error::InvalidAddress(s.to_string()));
            }
            let byte = u8::from_str_radix(octet, 16)
                .map_err(|_| Error::InvalidAddress(s.to_string()))?;
            value = (value << 8) | u64::from(byte);
        }

        Ok(Self(value))
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> String {
        mac.to_string()
    }
}

impl TryFrom<String> for MacAddr {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A single address managed by a pool
///
/// Addresses are not persisted on their own: they are derived from a
/// range base plus an integer offset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PoolAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    Mac(MacAddr),
}

impl PoolAddr {
    pub fn kind(&self) -> AddrKind {
        match self {
            PoolAddr::V4(_) => AddrKind::Ipv4,
            PoolAddr::V6(_) => AddrKind::Ipv6,
            PoolAddr::Mac(_) => AddrKind::Mac,
        }
    }

    /// Numeric value within the address family
    fn as_num(&self) -> u128 {
        match self {
            PoolAddr::V4(a) => u128::from(u32::from(*a)),
            PoolAddr::V6(a) => u128::from(*a),
            PoolAddr::Mac(m) => u128::from(m.to_u64()),
        }
    }

    fn from_num(kind: AddrKind, value: u128) -> Option<Self> {
        match kind {
            AddrKind::Ipv4 => u32::try_from(value).ok().map(|v| PoolAddr::V4(v.into())),
            AddrKind::Ipv6 => Some(PoolAddr::V6(Ipv6Addr::from(value))),
            AddrKind::Mac => u64::try_from(value)
                .ok()
                .and_then(MacAddr::new)
                .map(PoolAddr::Mac),
        }
    }

    /// Address `offset` positions above `self`, staying in the same family
    pub fn checked_add(&self, offset: u64) -> Option<Self> {
        let value = self.as_num().checked_add(u128::from(offset))?;
        Self::from_num(self.kind(), value)
    }

    /// Offset of `self` relative to `base`
    ///
    /// Returns `None` if the families differ or `self` precedes `base`.
    pub fn offset_from(&self, base: &PoolAddr) -> Option<u64> {
        if self.kind() != base.kind() {
            return None;
        }
        let diff = self.as_num().checked_sub(base.as_num())?;
        u64::try_from(diff).ok()
    }
}

impl fmt::Display for PoolAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolAddr::V4(a) => write!(f, "{}", a),
            PoolAddr::V6(a) => write!(f, "{}", a),
            PoolAddr::Mac(m) => write!(f, "{}", m),
        }
    }
}

impl FromStr for PoolAddr {
    type Err = Error;

    /// Parse the textual form of any supported family
    ///
    /// Dotted quads parse as IPv4, colon-hex with eight groups or `::`
    /// as IPv6, and six colon-separated octet pairs as MAC. The grammars
    /// are disjoint, so trying them in order is unambiguous.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(v4) = s.parse::<Ipv4Addr>() {
            return Ok(PoolAddr::V4(v4));
        }
        if let Ok(v6) = s.parse::<Ipv6Addr>() {
            return Ok(PoolAddr::V6(v6));
        }
        if let Ok(mac) = s.parse::<MacAddr>() {
            return Ok(PoolAddr::Mac(mac));
        }
        Err(Error::InvalidAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for PoolAddr {
    fn from(a: Ipv4Addr) -> Self {
        PoolAddr::V4(a)
    }
}

impl From<Ipv6Addr> for PoolAddr {
    fn from(a: Ipv6Addr) -> Self {
        PoolAddr::V6(a)
    }
}

impl From<MacAddr> for PoolAddr {
    fn from(m: MacAddr) -> Self {
        PoolAddr::Mac(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddr = "00:16:3e:00:00:ff".parse().unwrap();
        assert_eq!(mac.to_string(), "00:16:3e:00:00:ff");
        assert_eq!(mac.to_u64(), 0x0016_3e00_00ff);
    }

    #[test]
    fn test_mac_rejects_bad_forms() {
        assert!("00:16:3e:00:00".parse::<MacAddr>().is_err());
        assert!("00:16:3e:00:00:gg".parse::<MacAddr>().is_err());
        assert!("0:16:3e:00:00:ff".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_pool_addr_parse_precedence() {
        assert_eq!(
            "10.0.0.1".parse::<PoolAddr>().unwrap().kind(),
            AddrKind::Ipv4
        );
        assert_eq!(
            "2001:db8::1".parse::<PoolAddr>().unwrap().kind(),
            AddrKind::Ipv6
        );
        assert_eq!(
            "02:00:0a:00:00:01".parse::<PoolAddr>().unwrap().kind(),
            AddrKind::Mac
        );
        assert!("not-an-address".parse::<PoolAddr>().is_err());
    }

    #[test]
    fn test_offset_arithmetic() {
        let base: PoolAddr = "192.168.0.0".parse().unwrap();
        let third = base.checked_add(3).unwrap();
        assert_eq!(third.to_string(), "192.168.0.3");
        assert_eq!(third.offset_from(&base), Some(3));
        assert_eq!(base.offset_from(&third), None); // precedes base
    }

    #[test]
    fn test_offset_across_kinds_is_none() {
        let v4: PoolAddr = "10.0.0.1".parse().unwrap();
        let mac: PoolAddr = "02:00:00:00:00:01".parse().unwrap();
        assert_eq!(mac.offset_from(&v4), None);
    }

    #[test]
    fn test_checked_add_overflow() {
        let top: PoolAddr = "255.255.255.255".parse().unwrap();
        assert!(top.checked_add(1).is_none());

        let mac_top = PoolAddr::Mac(MacAddr::new(0xffff_ffff_ffff).unwrap());
        assert!(mac_top.checked_add(1).is_none());
    }

    #[test]
    fn test_addr_kind_parse() {
        assert_eq!("ip4".parse::<AddrKind>().unwrap(), AddrKind::Ipv4);
        assert_eq!("IP6".parse::<AddrKind>().unwrap(), AddrKind::Ipv6);
        assert_eq!("ether".parse::<AddrKind>().unwrap(), AddrKind::Mac);
        assert!("IPX".parse::<AddrKind>().is_err());
    }
}
