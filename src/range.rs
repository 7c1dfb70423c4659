//! Address ranges and lease bookkeeping
//!
//! An `AddressRange` is an ordered, possibly sparse block of addresses of
//! one family. Every present offset carries exactly one lease status.
//! Ranges become sparse when a subset of their addresses is removed.

use std::collections::BTreeMap;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::addr::{AddrKind, PoolAddr};
use crate::error::{Error, Result};
use crate::network::NetworkId;

/// Upper bound on addresses per range
///
/// Leases are materialized per address, so an unbounded IPv6 descriptor
/// would exhaust memory before the pool could reject it.
pub const MAX_RANGE_SIZE: u64 = 1 << 22;

/// Lease status of a single address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseStatus {
    /// Available for allocation
    Free,
    /// Bound to a consumer or delegated to a reservation
    Used,
    /// Administratively withdrawn from allocation
    OnHold,
}

/// One address slot inside a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub status: LeaseStatus,
    /// Owning object for `Used` leases; `Free` and `OnHold` carry none
    pub owner: Option<NetworkId>,
}

impl Lease {
    fn free() -> Self {
        Self {
            status: LeaseStatus::Free,
            owner: None,
        }
    }
}

/// Declared shape of a range before it is materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeDescriptor {
    pub base: PoolAddr,
    pub size: u64,
}

impl RangeDescriptor {
    pub fn new(base: PoolAddr, size: u64) -> Self {
        Self { base, size }
    }

    /// Derive a descriptor from a CIDR subnet
    ///
    /// The network and broadcast addresses are excluded for IPv4 prefixes
    /// shorter than /31, matching what a router would hand out.
    pub fn from_subnet(subnet: IpNet) -> Result<Self> {
        match subnet {
            IpNet::V4(net) => {
                let span = 1u64 << (32 - u32::from(net.prefix_len()));
                let (base, size) = if net.prefix_len() >= 31 {
                    (PoolAddr::V4(net.network()), span)
                } else {
                    let first = PoolAddr::V4(net.network())
                        .checked_add(1)
                        .ok_or(Error::EmptyRange(PoolAddr::V4(net.network())))?;
                    (first, span - 2)
                };
                Ok(Self { base, size })
            }
            IpNet::V6(net) => {
                let bits = 128 - u32::from(net.prefix_len());
                let span = 1u128
                    .checked_shl(bits)
                    .unwrap_or(u128::MAX);
                let size = u64::try_from(span).unwrap_or(u64::MAX);
                if size > MAX_RANGE_SIZE {
                    return Err(Error::RangeTooLarge {
                        size,
                        max: MAX_RANGE_SIZE,
                    });
                }
                Ok(Self {
                    base: PoolAddr::V6(net.network()),
                    size,
                })
            }
        }
    }

    pub fn kind(&self) -> AddrKind {
        self.base.kind()
    }

    /// Whether an address value falls inside the declared span
    pub fn contains(&self, addr: &PoolAddr) -> bool {
        addr.offset_from(&self.base)
            .is_some_and(|offset| offset < self.size)
    }
}

/// A block of addresses of one family with per-address lease state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    base: PoolAddr,
    /// Present offsets and their leases; sparse after partial removal
    leases: BTreeMap<u64, Lease>,
}

impl AddressRange {
    /// Materialize a descriptor with every address `Free`
    pub fn new(descriptor: &RangeDescriptor) -> Result<Self> {
        if descriptor.size == 0 {
            return Err(Error::EmptyRange(descriptor.base));
        }
        if descriptor.size > MAX_RANGE_SIZE {
            return Err(Error::RangeTooLarge {
                size: descriptor.size,
                max: MAX_RANGE_SIZE,
            });
        }
        // The whole span must stay inside the address family.
        descriptor
            .base
            .checked_add(descriptor.size - 1)
            .ok_or(Error::AddressOverflow {
                base: descriptor.base,
                offset: descriptor.size - 1,
            })?;

        let leases = (0..descriptor.size).map(|o| (o, Lease::free())).collect();
        Ok(Self {
            base: descriptor.base,
            leases,
        })
    }

    /// Build a sparse range holding exactly the given addresses, all `Free`
    ///
    /// The lowest address becomes the base. All addresses must share one
    /// family.
    pub fn from_addrs(addrs: &[PoolAddr]) -> Result<Self> {
        let base = *addrs
            .iter()
            .min()
            .ok_or(Error::InvalidAddress("empty address set".to_string()))?;

        let mut leases = BTreeMap::new();
        for addr in addrs {
            let offset = addr
                .offset_from(&base)
                .ok_or(Error::InvalidAddress(addr.to_string()))?;
            leases.insert(offset, Lease::free());
        }
        Ok(Self { base, leases })
    }

    pub fn base(&self) -> PoolAddr {
        self.base
    }

    pub fn kind(&self) -> AddrKind {
        self.base.kind()
    }

    /// Number of addresses currently part of the range
    pub fn len(&self) -> u64 {
        self.leases.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Concrete address at a present offset
    pub fn addr_at(&self, offset: u64) -> Option<PoolAddr> {
        if self.leases.contains_key(&offset) {
            self.base.checked_add(offset)
        } else {
            None
        }
    }

    /// Offset of an address value, if it is part of this range
    pub fn offset_of(&self, addr: &PoolAddr) -> Option<u64> {
        let offset = addr.offset_from(&self.base)?;
        self.leases.contains_key(&offset).then_some(offset)
    }

    pub fn lease(&self, offset: u64) -> Option<&Lease> {
        self.leases.get(&offset)
    }

    pub fn lease_mut(&mut self, offset: u64) -> Option<&mut Lease> {
        self.leases.get_mut(&offset)
    }

    /// Drop an address from the range entirely
    pub fn remove_offset(&mut self, offset: u64) -> Option<Lease> {
        self.leases.remove(&offset)
    }

    /// Present offsets in ascending order
    pub fn offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.leases.keys().copied()
    }

    /// Offsets of `Free` leases in ascending order
    pub fn free_offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.leases
            .iter()
            .filter(|(_, lease)| lease.status == LeaseStatus::Free)
            .map(|(offset, _)| *offset)
    }

    pub fn count_status(&self, status: LeaseStatus) -> u64 {
        self.leases
            .values()
            .filter(|lease| lease.status == status)
            .count() as u64
    }

    /// Whether any present address of this range falls inside a descriptor
    pub fn intersects(&self, descriptor: &RangeDescriptor) -> bool {
        if self.kind() != descriptor.kind() {
            return false;
        }
        self.offsets().any(|offset| {
            self.base
                .checked_add(offset)
                .is_some_and(|addr| descriptor.contains(&addr))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> PoolAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_new_range_all_free() {
        let range =
            AddressRange::new(&RangeDescriptor::new(v4("10.0.0.0"), 4)).unwrap();
        assert_eq!(range.len(), 4);
        assert_eq!(range.count_status(LeaseStatus::Free), 4);
        assert_eq!(range.addr_at(3), Some(v4("10.0.0.3")));
        assert_eq!(range.addr_at(4), None);
    }

    #[test]
    fn test_empty_and_oversized_descriptors() {
        assert!(matches!(
            AddressRange::new(&RangeDescriptor::new(v4("10.0.0.0"), 0)),
            Err(Error::EmptyRange(_))
        ));
        assert!(matches!(
            AddressRange::new(&RangeDescriptor::new(v4("10.0.0.0"), MAX_RANGE_SIZE + 1)),
            Err(Error::RangeTooLarge { .. })
        ));
    }

    #[test]
    fn test_range_overflowing_family_rejected() {
        let result = AddressRange::new(&RangeDescriptor::new(v4("255.255.255.254"), 4));
        assert!(matches!(result, Err(Error::AddressOverflow { .. })));
    }

    #[test]
    fn test_descriptor_from_v4_subnet() {
        let desc = RangeDescriptor::from_subnet("10.0.1.0/29".parse().unwrap()).unwrap();
        assert_eq!(desc.base, v4("10.0.1.1"));
        assert_eq!(desc.size, 6); // network and broadcast excluded

        let tiny = RangeDescriptor::from_subnet("10.0.1.0/31".parse().unwrap()).unwrap();
        assert_eq!(tiny.base, v4("10.0.1.0"));
        assert_eq!(tiny.size, 2);
    }

    #[test]
    fn test_descriptor_from_v6_subnet() {
        let desc =
            RangeDescriptor::from_subnet("2001:db8::/120".parse().unwrap()).unwrap();
        assert_eq!(desc.size, 256);
        assert!(RangeDescriptor::from_subnet("2001:db8::/64".parse().unwrap()).is_err());
    }

    #[test]
    fn test_sparse_range_from_addrs() {
        let range =
            AddressRange::from_addrs(&[v4("10.0.0.0"), v4("10.0.0.2")]).unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range.base(), v4("10.0.0.0"));
        assert_eq!(range.offset_of(&v4("10.0.0.2")), Some(2));
        // Offset 1 was never part of the range.
        assert_eq!(range.offset_of(&v4("10.0.0.1")), None);
        assert_eq!(range.addr_at(1), None);
    }

    #[test]
    fn test_intersects_respects_removed_addresses() {
        let mut range =
            AddressRange::new(&RangeDescriptor::new(v4("10.0.0.0"), 4)).unwrap();
        let probe = RangeDescriptor::new(v4("10.0.0.2"), 1);
        assert!(range.intersects(&probe));

        range.remove_offset(2);
        assert!(!range.intersects(&probe));
    }

    #[test]
    fn test_intersects_is_per_family() {
        let range =
            AddressRange::new(&RangeDescriptor::new(v4("10.0.0.0"), 4)).unwrap();
        let mac = RangeDescriptor::new("02:00:0a:00:00:00".parse().unwrap(), 4);
        assert!(!range.intersects(&mac));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut range =
            AddressRange::new(&RangeDescriptor::new(v4("10.0.0.0"), 3)).unwrap();
        range.lease_mut(1).unwrap().status = LeaseStatus::OnHold;

        let json = serde_json::to_string(&range).unwrap();
        let restored: AddressRange = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, range);
    }
}
