//! Virtual network resource objects
//!
//! A `VirtualNetwork` owns a lease table plus ownership metadata. Networks
//! created by a reservation point back at their parent network.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::table::LeaseTable;

/// Identifier of a virtual network
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NetworkId(pub u32);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NetworkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        s.parse::<u32>()
            .map(NetworkId)
            .map_err(|_| Error::InvalidAddress(format!("network id '{}'", s)))
    }
}

/// A virtual network and its address lease pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetwork {
    pub id: NetworkId,
    pub name: String,
    pub owner_uid: u32,
    pub owner_gid: u32,
    /// Set when this network was carved out of another by a reservation
    pub parent_id: Option<NetworkId>,
    pub table: LeaseTable,
}

impl VirtualNetwork {
    pub fn new(id: NetworkId, name: impl Into<String>, owner_uid: u32, owner_gid: u32) -> Self {
        Self {
            id,
            name: name.into(),
            owner_uid,
            owner_gid,
            parent_id: None,
            table: LeaseTable::new(),
        }
    }

    /// Whether any lease is still bound to a consumer
    ///
    /// Deleting a network with used leases is refused; cascade policy
    /// belongs to the caller.
    pub fn in_use(&self) -> bool {
        self.table.any_used()
    }
}
