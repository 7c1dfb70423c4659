//! Reservations: carving a sub-pool into a new network
//!
//! A reservation selects free addresses from a source network, binds
//! them into a freshly created network owned by the target user/group,
//! and marks them delegated in the source. The two snapshots are
//! committed child-first so a failed parent commit can still roll the
//! child back.

use std::sync::Arc;

use crate::addr::AddrKind;
use crate::error::Result;
use crate::network::{NetworkId, VirtualNetwork};
use crate::pool::PoolCoordinator;
use crate::range::AddressRange;
use crate::table::LeaseTable;

/// Orchestrates the two-network reservation transaction
pub struct ReservationEngine {
    coordinator: Arc<PoolCoordinator>,
}

impl ReservationEngine {
    pub fn new(coordinator: Arc<PoolCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Carve `count` free addresses of `kind` out of `source` into a new
    /// network owned by `owner_uid`/`owner_gid`
    ///
    /// Selection uses the same lowest-offset-first order as consumer
    /// allocation. In the source the selected addresses become `Used`
    /// with the child network as owner; in the child they start `Free`.
    pub async fn reserve(
        &self,
        source: NetworkId,
        count: u64,
        kind: AddrKind,
        owner_uid: u32,
        owner_gid: u32,
        name: Option<String>,
    ) -> Result<NetworkId> {
        let store = self.coordinator.store().clone();
        let child_id = store.next_id()?;

        // Both ids, ascending order. The child is not visible to anyone
        // else yet, but the fixed order keeps pair acquisition uniform.
        let guards = self.coordinator.lock_pair(source, child_id).await;

        let result = (|| -> Result<NetworkId> {
            let mut parent = store.load(source)?;
            let slots = parent.table.select_free(count, kind, None)?;
            let addrs = parent.table.slot_addrs(&slots);

            let mut child = VirtualNetwork::new(
                child_id,
                name.unwrap_or_else(|| format!("{}-reservation-{}", parent.name, child_id)),
                owner_uid,
                owner_gid,
            );
            child.parent_id = Some(source);
            child.table = LeaseTable::with_range(AddressRange::from_addrs(&addrs)?);

            // Delegated, not directly assignable, in the parent.
            parent.table.mark_used(&slots, child_id);

            store.save(&child)?;
            if let Err(commit) = store.save(&parent) {
                // The parent marks never became durable; the child must
                // not survive on its own.
                if let Err(cleanup) = store.remove(child_id) {
                    log::warn!(
                        "could not roll back reservation {} after failed parent commit: {}",
                        child_id,
                        cleanup
                    );
                }
                return Err(commit);
            }

            log::info!(
                "reserved {} {} addresses from network {} into network {}",
                count,
                kind,
                source,
                child_id
            );
            Ok(child_id)
        })();

        drop(guards);
        self.coordinator.reap(source).await;
        self.coordinator.reap(child_id).await;
        result
    }
}
