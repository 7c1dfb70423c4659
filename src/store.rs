//! Durable storage of network snapshots
//!
//! One JSON snapshot per network, written atomically (temp file + rename)
//! so a crashed commit never leaves a half-written snapshot behind. The
//! `Store` trait is the seam the pool coordinator talks through; tests
//! swap in an in-memory store with failure injection.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::network::{NetworkId, VirtualNetwork};

/// Transactional get/put of network snapshots, keyed by id
pub trait Store: Send + Sync {
    fn load(&self, id: NetworkId) -> Result<VirtualNetwork>;
    fn save(&self, network: &VirtualNetwork) -> Result<()>;
    fn remove(&self, id: NetworkId) -> Result<()>;
    /// Mint the next unused network id
    fn next_id(&self) -> Result<NetworkId>;
    fn list(&self) -> Result<Vec<NetworkId>>;
}

/// Filesystem-backed store under a data directory
pub struct FsStore {
    root: PathBuf,
    /// Serializes id counter read-modify-write
    seq_lock: Mutex<()>,
}

impl FsStore {
    /// Open (and create if needed) a store under `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("networks"))?;
        Ok(Self {
            root,
            seq_lock: Mutex::new(()),
        })
    }

    fn network_path(&self, id: NetworkId) -> PathBuf {
        self.root.join("networks").join(format!("{}.json", id))
    }

    fn seq_path(&self) -> PathBuf {
        self.root.join("next_id")
    }

    /// Write a file atomically via a temp sibling and rename
    fn write_atomic(&self, path: &PathBuf, content: &str) -> io::Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)
    }
}

impl Store for FsStore {
    fn load(&self, id: NetworkId) -> Result<VirtualNetwork> {
        let path = self.network_path(id);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::NetworkNotFound(id)
            } else {
                Error::Io(e)
            }
        })?;
        serde_json::from_str(&content).map_err(|e| Error::CorruptSnapshot {
            path,
            reason: e.to_string(),
        })
    }

    fn save(&self, network: &VirtualNetwork) -> Result<()> {
        let content =
            serde_json::to_string_pretty(network).map_err(|e| Error::Persistence {
                id: network.id,
                reason: e.to_string(),
            })?;
        self.write_atomic(&self.network_path(network.id), &content)
            .map_err(|e| Error::Persistence {
                id: network.id,
                reason: e.to_string(),
            })
    }

    fn remove(&self, id: NetworkId) -> Result<()> {
        fs::remove_file(self.network_path(id)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::NetworkNotFound(id)
            } else {
                Error::Io(e)
            }
        })
    }

    fn next_id(&self) -> Result<NetworkId> {
        let _guard = self
            .seq_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current: u32 = match fs::read_to_string(self.seq_path()) {
            Ok(content) => content.trim().parse().map_err(|_| Error::CorruptSnapshot {
                path: self.seq_path(),
                reason: "id counter is not a number".to_string(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(Error::Io(e)),
        };

        let next = current + 1;
        self.write_atomic(&self.seq_path(), &next.to_string())?;
        Ok(NetworkId(next))
    }

    fn list(&self) -> Result<Vec<NetworkId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.root.join("networks"))? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(id) = stem.parse::<u32>() {
                ids.push(NetworkId(id));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory store with per-id save failure injection
#[cfg(test)]
pub mod testing {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct MemStore {
        networks: Mutex<BTreeMap<NetworkId, VirtualNetwork>>,
        next: AtomicU32,
        fail_saves: Mutex<HashSet<NetworkId>>,
    }

    impl MemStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `save` of this id fail with a persistence error
        pub fn fail_next_save(&self, id: NetworkId) {
            self.fail_saves.lock().unwrap().insert(id);
        }

        pub fn contains(&self, id: NetworkId) -> bool {
            self.networks.lock().unwrap().contains_key(&id)
        }
    }

    impl Store for MemStore {
        fn load(&self, id: NetworkId) -> Result<VirtualNetwork> {
            self.networks
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(Error::NetworkNotFound(id))
        }

        fn save(&self, network: &VirtualNetwork) -> Result<()> {
            if self.fail_saves.lock().unwrap().remove(&network.id) {
                return Err(Error::Persistence {
                    id: network.id,
                    reason: "injected failure".to_string(),
                });
            }
            self.networks
                .lock()
                .unwrap()
                .insert(network.id, network.clone());
            Ok(())
        }

        fn remove(&self, id: NetworkId) -> Result<()> {
            self.networks
                .lock()
                .unwrap()
                .remove(&id)
                .map(|_| ())
                .ok_or(Error::NetworkNotFound(id))
        }

        fn next_id(&self) -> Result<NetworkId> {
            Ok(NetworkId(self.next.fetch_add(1, Ordering::SeqCst) + 1))
        }

        fn list(&self) -> Result<Vec<NetworkId>> {
            Ok(self.networks.lock().unwrap().keys().copied().collect())
        }
    }
}
