//! Per-network concurrency and durability wrapper
//!
//! Every mutating operation against a network runs under that network's
//! own lock: operations on one id are linearized, operations on
//! different ids never block each other. A mutation runs against a
//! working copy loaded from the store and is persisted before the lock
//! is released; on any error nothing reaches the store and the error
//! propagates unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::Result;
use crate::network::{NetworkId, VirtualNetwork};
use crate::store::Store;

/// Serializes and persists operations against virtual networks
pub struct PoolCoordinator {
    store: Arc<dyn Store>,
    /// Per-id locks, created lazily and reaped once uncontended
    locks: Mutex<HashMap<NetworkId, Arc<Mutex<()>>>>,
}

impl PoolCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn slot(&self, id: NetworkId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire exclusive access to one network id
    pub async fn lock(&self, id: NetworkId) -> OwnedMutexGuard<()> {
        self.slot(id).await.lock_owned().await
    }

    /// Acquire two ids in ascending order
    ///
    /// The fixed global order prevents deadlock against a concurrent
    /// reverse acquisition. The returned guards are in ascending-id
    /// order, not argument order.
    pub async fn lock_pair(
        &self,
        a: NetworkId,
        b: NetworkId,
    ) -> (OwnedMutexGuard<()>, OwnedMutexGuard<()>) {
        debug_assert_ne!(a, b);
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let lower = self.lock(first).await;
        let upper = self.lock(second).await;
        (lower, upper)
    }

    /// Drop the lock entry for an id nobody is waiting on
    pub async fn reap(&self, id: NetworkId) {
        let mut locks = self.locks.lock().await;
        if let Some(slot) = locks.get(&id) {
            // The map holds the only reference once all guards are gone.
            if Arc::strong_count(slot) == 1 {
                locks.remove(&id);
            }
        }
    }

    /// Run a mutation against a network and persist the result
    ///
    /// `f` operates on a working copy of the last durable snapshot. On
    /// success the copy is saved before the lock is released; on any
    /// error (from `f` or from the commit) the copy is discarded and the
    /// error is returned unchanged.
    pub async fn with_locked<T, F>(&self, id: NetworkId, f: F) -> Result<T>
    where
        F: FnOnce(&mut VirtualNetwork) -> Result<T>,
    {
        let guard = self.lock(id).await;
        let result = self.store.load(id).and_then(|mut network| {
            let out = f(&mut network)?;
            self.store.save(&network)?;
            Ok(out)
        });
        drop(guard);
        self.reap(id).await;
        result
    }

    /// Read a consistent snapshot of a network
    pub async fn snapshot(&self, id: NetworkId) -> Result<VirtualNetwork> {
        let guard = self.lock(id).await;
        let result = self.store.load(id);
        drop(guard);
        self.reap(id).await;
        result
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::error::Error;
    use crate::range::RangeDescriptor;
    use crate::store::testing::MemStore;

    fn setup(ids: &[u32]) -> (Arc<MemStore>, PoolCoordinator) {
        let store = Arc::new(MemStore::new());
        for &id in ids {
            store
                .save(&VirtualNetwork::new(NetworkId(id), format!("net{}", id), 0, 0))
                .unwrap();
        }
        let coordinator = PoolCoordinator::new(store.clone() as Arc<dyn Store>);
        (store, coordinator)
    }

    #[tokio::test]
    async fn test_with_locked_persists_on_success() {
        let (store, coordinator) = setup(&[1]);
        coordinator
            .with_locked(NetworkId(1), |vn| {
                vn.table
                    .add(&RangeDescriptor::new("10.0.0.0".parse().unwrap(), 4))
            })
            .await
            .unwrap();

        assert_eq!(store.load(NetworkId(1)).unwrap().table.len(), 4);
        // The lock entry is reaped once nobody waits on it.
        assert_eq!(coordinator.lock_count().await, 0);
    }

    #[tokio::test]
    async fn test_with_locked_discards_on_operation_error() {
        let (store, coordinator) = setup(&[1]);
        let result: Result<()> = coordinator
            .with_locked(NetworkId(1), |vn| {
                vn.table
                    .add(&RangeDescriptor::new("10.0.0.0".parse().unwrap(), 4))?;
                Err(Error::AddressInUse("10.0.0.0".parse().unwrap()))
            })
            .await;

        assert!(matches!(result, Err(Error::AddressInUse(_))));
        assert_eq!(store.load(NetworkId(1)).unwrap().table.len(), 0);
    }

    #[tokio::test]
    async fn test_with_locked_discards_on_commit_failure() {
        let (store, coordinator) = setup(&[1]);
        store.fail_next_save(NetworkId(1));

        let result = coordinator
            .with_locked(NetworkId(1), |vn| {
                vn.table
                    .add(&RangeDescriptor::new("10.0.0.0".parse().unwrap(), 4))
            })
            .await;

        assert!(matches!(result, Err(Error::Persistence { .. })));
        assert_eq!(store.load(NetworkId(1)).unwrap().table.len(), 0);

        // The failure is not fatal: the next operation succeeds.
        coordinator
            .with_locked(NetworkId(1), |vn| {
                vn.table
                    .add(&RangeDescriptor::new("10.0.0.0".parse().unwrap(), 4))
            })
            .await
            .unwrap();
        assert_eq!(store.load(NetworkId(1)).unwrap().table.len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_network_reported() {
        let (_store, coordinator) = setup(&[]);
        let result = coordinator.with_locked(NetworkId(9), |_vn| Ok(())).await;
        assert!(matches!(result, Err(Error::NetworkNotFound(NetworkId(9)))));
    }

    #[tokio::test]
    async fn test_same_id_blocks_different_id_does_not() {
        let (_store, coordinator) = setup(&[1, 2]);
        let held = coordinator.lock(NetworkId(1)).await;

        // Another id is immediately available.
        timeout(Duration::from_millis(50), coordinator.lock(NetworkId(2)))
            .await
            .expect("different id must not block");

        // The held id is not.
        assert!(
            timeout(Duration::from_millis(50), coordinator.lock(NetworkId(1)))
                .await
                .is_err()
        );
        drop(held);
    }

    #[tokio::test]
    async fn test_lock_pair_reverse_orders_do_not_deadlock() {
        let (_store, coordinator) = setup(&[1, 2]);
        let coordinator = Arc::new(coordinator);

        let mut tasks = Vec::new();
        for i in 0..32u32 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                let (a, b) = if i % 2 == 0 {
                    (NetworkId(1), NetworkId(2))
                } else {
                    (NetworkId(2), NetworkId(1))
                };
                let guards = coordinator.lock_pair(a, b).await;
                tokio::time::sleep(Duration::from_millis(1)).await;
                drop(guards);
            }));
        }

        timeout(Duration::from_secs(5), async {
            for task in tasks {
                task.await.unwrap();
            }
        })
        .await
        .expect("pair locking deadlocked");
    }

    #[tokio::test]
    async fn test_sequential_mutations_are_not_lost() {
        let (store, coordinator) = setup(&[1]);
        let coordinator = Arc::new(coordinator);

        let mut tasks = Vec::new();
        for i in 0..4u8 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .with_locked(NetworkId(1), move |vn| {
                        let base = format!("10.0.{}.0", i).parse().unwrap();
                        vn.table.add(&RangeDescriptor::new(base, 2))
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Every mutation observed its predecessor's result.
        assert_eq!(store.load(NetworkId(1)).unwrap().table.len(), 8);
    }
}
