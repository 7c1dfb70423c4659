//! The lease operation surface
//!
//! The dispatch layer decodes a remote request into one `LeaseOp` and
//! hands it to `LeasePool::apply`. Five operations cover the pool
//! surface: add, remove, hold, release and reserve. Each runs under the
//! target network's lock and either commits fully or changes nothing.

use std::sync::Arc;

use crate::addr::{AddrKind, PoolAddr};
use crate::error::{Error, Result};
use crate::network::{NetworkId, VirtualNetwork};
use crate::pool::PoolCoordinator;
use crate::range::RangeDescriptor;
use crate::reserve::ReservationEngine;
use crate::store::Store;
use crate::table::FreeOutcome;

/// Parameters of `add_leases`
#[derive(Debug, Clone)]
pub struct AddLeases {
    pub network: NetworkId,
    pub range: RangeDescriptor,
}

/// Parameters of `remove_leases`
#[derive(Debug, Clone)]
pub struct RemoveLeases {
    pub network: NetworkId,
    pub addresses: Vec<PoolAddr>,
}

/// Parameters of `hold_leases`
#[derive(Debug, Clone)]
pub struct HoldLeases {
    pub network: NetworkId,
    pub addresses: Vec<PoolAddr>,
}

/// Parameters of `free_leases` (release of held addresses)
#[derive(Debug, Clone)]
pub struct ReleaseLeases {
    pub network: NetworkId,
    pub addresses: Vec<PoolAddr>,
}

/// Parameters of `reserve_leases`
#[derive(Debug, Clone)]
pub struct ReserveLeases {
    pub network: NetworkId,
    pub count: u64,
    pub kind: AddrKind,
    pub owner_uid: u32,
    pub owner_gid: u32,
    pub name: Option<String>,
}

/// The closed set of pool operations
#[derive(Debug, Clone)]
pub enum LeaseOp {
    Add(AddLeases),
    Remove(RemoveLeases),
    Hold(HoldLeases),
    Release(ReleaseLeases),
    Reserve(ReserveLeases),
}

/// Result of a dispatched operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Done,
    Reserved(NetworkId),
}

/// The pool facade handed to the dispatch layer
///
/// Construction happens once at process start; the store handle and
/// coordinator are passed in explicitly rather than reached through
/// process-global state.
pub struct LeasePool {
    coordinator: Arc<PoolCoordinator>,
    reservations: ReservationEngine,
}

impl LeasePool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let coordinator = Arc::new(PoolCoordinator::new(store));
        let reservations = ReservationEngine::new(coordinator.clone());
        Self {
            coordinator,
            reservations,
        }
    }

    /// Dispatch one decoded operation
    pub async fn apply(&self, op: LeaseOp) -> Result<OpOutcome> {
        match op {
            LeaseOp::Add(p) => {
                self.add_leases(p.network, &p.range).await?;
                Ok(OpOutcome::Done)
            }
            LeaseOp::Remove(p) => {
                self.remove_leases(p.network, &p.addresses).await?;
                Ok(OpOutcome::Done)
            }
            LeaseOp::Hold(p) => {
                self.hold_leases(p.network, &p.addresses).await?;
                Ok(OpOutcome::Done)
            }
            LeaseOp::Release(p) => {
                self.free_leases(p.network, &p.addresses).await?;
                Ok(OpOutcome::Done)
            }
            LeaseOp::Reserve(p) => {
                let child = self
                    .reserve_leases(p.network, p.count, p.kind, p.owner_uid, p.owner_gid, p.name)
                    .await?;
                Ok(OpOutcome::Reserved(child))
            }
        }
    }

    /// Append a range of fresh leases to a network
    pub async fn add_leases(&self, id: NetworkId, range: &RangeDescriptor) -> Result<()> {
        let range = *range;
        self.coordinator
            .with_locked(id, move |vn| vn.table.add(&range))
            .await
    }

    /// Remove addresses from a network's pool
    pub async fn remove_leases(&self, id: NetworkId, addresses: &[PoolAddr]) -> Result<()> {
        let addresses = addresses.to_vec();
        self.coordinator
            .with_locked(id, move |vn| vn.table.remove(&addresses))
            .await
    }

    /// Withdraw free addresses from allocation
    pub async fn hold_leases(&self, id: NetworkId, addresses: &[PoolAddr]) -> Result<()> {
        let addresses = addresses.to_vec();
        self.coordinator
            .with_locked(id, move |vn| vn.table.hold(&addresses))
            .await
    }

    /// Release held addresses back to the free pool
    pub async fn free_leases(&self, id: NetworkId, addresses: &[PoolAddr]) -> Result<()> {
        let addresses = addresses.to_vec();
        self.coordinator
            .with_locked(id, move |vn| vn.table.release(&addresses))
            .await
    }

    /// Carve free addresses into a new network for a user/group
    pub async fn reserve_leases(
        &self,
        id: NetworkId,
        count: u64,
        kind: AddrKind,
        owner_uid: u32,
        owner_gid: u32,
        name: Option<String>,
    ) -> Result<NetworkId> {
        self.reservations
            .reserve(id, count, kind, owner_uid, owner_gid, name)
            .await
    }

    /// Allocate addresses to a consumer object
    pub async fn allocate(
        &self,
        id: NetworkId,
        count: u64,
        kind: AddrKind,
        preferred: Option<PoolAddr>,
        owner: NetworkId,
    ) -> Result<Vec<PoolAddr>> {
        self.coordinator
            .with_locked(id, move |vn| vn.table.allocate(count, kind, preferred, owner))
            .await
    }

    /// Deallocate a consumer's addresses, checking ownership
    pub async fn deallocate(
        &self,
        id: NetworkId,
        addresses: &[PoolAddr],
        owner: NetworkId,
        force: bool,
    ) -> Result<FreeOutcome> {
        let addresses = addresses.to_vec();
        let outcome = self
            .coordinator
            .with_locked(id, move |vn| vn.table.free(&addresses, owner, force))
            .await?;
        for addr in &outcome.skipped {
            log::warn!("network {}: skipped deallocation of {}", id, addr);
        }
        Ok(outcome)
    }

    /// Create a new network with declared ranges
    pub async fn create_network(
        &self,
        name: impl Into<String>,
        owner_uid: u32,
        owner_gid: u32,
        ranges: &[RangeDescriptor],
    ) -> Result<NetworkId> {
        let store = self.coordinator.store().clone();
        let id = store.next_id()?;
        let guard = self.coordinator.lock(id).await;

        let result = (|| -> Result<NetworkId> {
            let mut vn = VirtualNetwork::new(id, name, owner_uid, owner_gid);
            for range in ranges {
                vn.table.add(range)?;
            }
            store.save(&vn)?;
            Ok(id)
        })();

        drop(guard);
        self.coordinator.reap(id).await;
        result
    }

    /// Delete a network that has no used leases left
    pub async fn destroy_network(&self, id: NetworkId) -> Result<()> {
        let store = self.coordinator.store().clone();
        let guard = self.coordinator.lock(id).await;

        let result = (|| -> Result<()> {
            let vn = store.load(id)?;
            if vn.in_use() {
                return Err(Error::NetworkInUse(id));
            }
            store.remove(id)
        })();

        drop(guard);
        self.coordinator.reap(id).await;
        result
    }

    /// Consistent snapshot of one network
    pub async fn network_info(&self, id: NetworkId) -> Result<VirtualNetwork> {
        self.coordinator.snapshot(id).await
    }

    pub fn list_networks(&self) -> Result<Vec<NetworkId>> {
        self.coordinator.store().list()
    }
}
