//! Lease table: the union of a network's address ranges
//!
//! All mutating operations are all-or-nothing: the requested set is
//! validated in full before any lease changes state. Allocation order is
//! deterministic (ranges in declaration order, offsets ascending).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::addr::{AddrKind, PoolAddr};
use crate::error::{Error, Result};
use crate::network::NetworkId;
use crate::range::{AddressRange, LeaseStatus, RangeDescriptor};

/// Aggregated lease counters for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaseCounts {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub on_hold: u64,
}

/// Result of an owner-checked deallocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeOutcome {
    /// Addresses returned to the free pool
    pub freed: Vec<PoolAddr>,
    /// Addresses left untouched (not `Used`, or owned by someone else)
    pub skipped: Vec<PoolAddr>,
}

/// Ordered collection of a network's address ranges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseTable {
    ranges: Vec<AddressRange>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding a single pre-built range
    pub fn with_range(range: AddressRange) -> Self {
        Self {
            ranges: vec![range],
        }
    }

    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    /// Append a new range with every address `Free`
    ///
    /// Fails if any address value of the descriptor is already part of a
    /// range of the same family.
    pub fn add(&mut self, descriptor: &RangeDescriptor) -> Result<()> {
        if self.ranges.iter().any(|r| r.intersects(descriptor)) {
            return Err(Error::RangeOverlap {
                base: descriptor.base,
                size: descriptor.size,
            });
        }
        self.ranges.push(AddressRange::new(descriptor)?);
        Ok(())
    }

    /// Find the range and offset holding an address value
    fn locate(&self, addr: &PoolAddr) -> Option<(usize, u64)> {
        self.ranges
            .iter()
            .enumerate()
            .find_map(|(idx, range)| range.offset_of(addr).map(|offset| (idx, offset)))
    }

    fn status_of(&self, idx: usize, offset: u64) -> LeaseStatus {
        self.ranges[idx]
            .lease(offset)
            .expect("offset came from the lease map")
            .status
    }

    /// Resolve the requested set, rejecting unknown addresses
    ///
    /// Duplicates collapse to a single slot.
    fn resolve(&self, addrs: &[PoolAddr]) -> Result<BTreeSet<(usize, u64)>> {
        let mut slots = BTreeSet::new();
        for addr in addrs {
            let slot = self
                .locate(addr)
                .ok_or(Error::AddressNotFound(*addr))?;
            slots.insert(slot);
        }
        Ok(slots)
    }

    /// Remove addresses from the table
    ///
    /// `Used` addresses are not removable; `OnHold` ones are. A range that
    /// loses part of its addresses stays behind as a sparse range, and a
    /// range that loses all of them is dropped.
    pub fn remove(&mut self, addrs: &[PoolAddr]) -> Result<()> {
        let slots = self.resolve(addrs)?;
        for &(idx, offset) in &slots {
            if self.status_of(idx, offset) == LeaseStatus::Used {
                let addr = self.ranges[idx]
                    .addr_at(offset)
                    .expect("offset came from the lease map");
                return Err(Error::AddressInUse(addr));
            }
        }

        for &(idx, offset) in &slots {
            self.ranges[idx].remove_offset(offset);
        }
        self.ranges.retain(|range| !range.is_empty());
        Ok(())
    }

    /// Withdraw `Free` addresses from allocation
    pub fn hold(&mut self, addrs: &[PoolAddr]) -> Result<()> {
        let slots = self.resolve(addrs)?;
        for &(idx, offset) in &slots {
            if self.status_of(idx, offset) != LeaseStatus::Free {
                let addr = self.ranges[idx]
                    .addr_at(offset)
                    .expect("offset came from the lease map");
                return Err(Error::AddressNotFree(addr));
            }
        }

        for &(idx, offset) in &slots {
            let lease = self.ranges[idx]
                .lease_mut(offset)
                .expect("offset came from the lease map");
            lease.status = LeaseStatus::OnHold;
            lease.owner = None;
        }
        Ok(())
    }

    /// Return `OnHold` addresses to the free pool
    pub fn release(&mut self, addrs: &[PoolAddr]) -> Result<()> {
        let slots = self.resolve(addrs)?;
        for &(idx, offset) in &slots {
            if self.status_of(idx, offset) != LeaseStatus::OnHold {
                let addr = self.ranges[idx]
                    .addr_at(offset)
                    .expect("offset came from the lease map");
                return Err(Error::AddressNotHeld(addr));
            }
        }

        for &(idx, offset) in &slots {
            let lease = self.ranges[idx]
                .lease_mut(offset)
                .expect("offset came from the lease map");
            lease.status = LeaseStatus::Free;
            lease.owner = None;
        }
        Ok(())
    }

    /// Pick `count` free addresses of one family without mutating state
    ///
    /// Selection order: the preferred address first when given and free,
    /// then ranges in declaration order with offsets ascending. The same
    /// order drives both consumer allocation and reservations.
    pub fn select_free(
        &self,
        count: u64,
        kind: AddrKind,
        preferred: Option<PoolAddr>,
    ) -> Result<Vec<(usize, u64)>> {
        let mut selected: Vec<(usize, u64)> = Vec::new();

        if let Some(addr) = preferred {
            if let Some(slot) = self.locate(&addr) {
                if addr.kind() == kind && self.status_of(slot.0, slot.1) == LeaseStatus::Free
                {
                    selected.push(slot);
                }
            }
        }

        for (idx, range) in self.ranges.iter().enumerate() {
            if range.kind() != kind {
                continue;
            }
            for offset in range.free_offsets() {
                if selected.len() as u64 >= count {
                    break;
                }
                if !selected.contains(&(idx, offset)) {
                    selected.push((idx, offset));
                }
            }
        }

        if (selected.len() as u64) < count {
            return Err(Error::InsufficientAddresses {
                requested: count,
                available: self.free_count(Some(kind)),
            });
        }
        selected.truncate(count as usize);
        Ok(selected)
    }

    /// Mark previously selected slots `Used` by `owner`
    pub fn mark_used(&mut self, slots: &[(usize, u64)], owner: NetworkId) {
        for &(idx, offset) in slots {
            let lease = self.ranges[idx]
                .lease_mut(offset)
                .expect("offset came from the lease map");
            lease.status = LeaseStatus::Used;
            lease.owner = Some(owner);
        }
    }

    /// Allocate `count` free addresses to a consumer
    pub fn allocate(
        &mut self,
        count: u64,
        kind: AddrKind,
        preferred: Option<PoolAddr>,
        owner: NetworkId,
    ) -> Result<Vec<PoolAddr>> {
        let slots = self.select_free(count, kind, preferred)?;
        let addrs = self.slot_addrs(&slots);
        self.mark_used(&slots, owner);
        Ok(addrs)
    }

    /// Deallocate `Used` addresses whose owner matches
    ///
    /// Mismatched or non-`Used` addresses are skipped and reported in the
    /// outcome rather than silently dropped. `force` frees regardless of
    /// owner.
    pub fn free(
        &mut self,
        addrs: &[PoolAddr],
        owner: NetworkId,
        force: bool,
    ) -> Result<FreeOutcome> {
        let slots = self.resolve(addrs)?;
        let mut outcome = FreeOutcome {
            freed: Vec::new(),
            skipped: Vec::new(),
        };

        for &(idx, offset) in &slots {
            let addr = self.ranges[idx]
                .addr_at(offset)
                .expect("offset came from the lease map");
            let lease = self.ranges[idx]
                .lease_mut(offset)
                .expect("offset came from the lease map");
            let owned_by_caller = lease.owner == Some(owner);
            if lease.status == LeaseStatus::Used && (force || owned_by_caller) {
                lease.status = LeaseStatus::Free;
                lease.owner = None;
                outcome.freed.push(addr);
            } else {
                outcome.skipped.push(addr);
            }
        }
        Ok(outcome)
    }

    /// Concrete addresses of selected slots
    pub fn slot_addrs(&self, slots: &[(usize, u64)]) -> Vec<PoolAddr> {
        slots
            .iter()
            .map(|&(idx, offset)| {
                self.ranges[idx]
                    .addr_at(offset)
                    .expect("offset came from the lease map")
            })
            .collect()
    }

    /// Free addresses, optionally restricted to one family
    pub fn free_count(&self, kind: Option<AddrKind>) -> u64 {
        self.ranges
            .iter()
            .filter(|range| kind.is_none_or(|k| range.kind() == k))
            .map(|range| range.count_status(LeaseStatus::Free))
            .sum()
    }

    /// Total addresses currently in the table
    pub fn len(&self) -> u64 {
        self.ranges.iter().map(AddressRange::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn counts(&self) -> LeaseCounts {
        LeaseCounts {
            total: self.len(),
            free: self.free_count(None),
            used: self
                .ranges
                .iter()
                .map(|r| r.count_status(LeaseStatus::Used))
                .sum(),
            on_hold: self
                .ranges
                .iter()
                .map(|r| r.count_status(LeaseStatus::OnHold))
                .sum(),
        }
    }

    /// Whether any lease is bound to a consumer
    pub fn any_used(&self) -> bool {
        self.ranges
            .iter()
            .any(|r| r.count_status(LeaseStatus::Used) > 0)
    }
}
