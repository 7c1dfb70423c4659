//! Unified error types for Anchorage

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::addr::PoolAddr;
use crate::network::NetworkId;

/// Main error type for Anchorage operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Address errors
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid address kind '{0}' (expected IP4, IP6 or ETHER)")]
    InvalidAddrKind(String),

    #[error("Address {base} + {offset} overflows its address family")]
    AddressOverflow { base: PoolAddr, offset: u64 },

    #[error("Address {0} is not part of any range")]
    AddressNotFound(PoolAddr),

    // Lease state errors
    #[error("Range of {size} addresses starting at {base} overlaps an existing range")]
    RangeOverlap { base: PoolAddr, size: u64 },

    #[error("Empty address range starting at {0}")]
    EmptyRange(PoolAddr),

    #[error("Range of {size} addresses exceeds the per-range limit of {max}")]
    RangeTooLarge { size: u64, max: u64 },

    #[error("Address {0} is in use")]
    AddressInUse(PoolAddr),

    #[error("Address {0} is not free")]
    AddressNotFree(PoolAddr),

    #[error("Address {0} is not on hold")]
    AddressNotHeld(PoolAddr),

    #[error("Not enough free addresses: requested {requested}, available {available}")]
    InsufficientAddresses { requested: u64, available: u64 },

    // Network errors
    #[error("Virtual network {0} not found")]
    NetworkNotFound(NetworkId),

    #[error("Virtual network {0} still has leases in use")]
    NetworkInUse(NetworkId),

    // Persistence errors
    #[error("Failed to persist network {id}: {reason}")]
    Persistence { id: NetworkId, reason: String },

    #[error("Corrupt network snapshot '{path}': {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    // Template errors
    #[error("Template parse failed: {0}")]
    TemplateParseFailed(String),

    // CLI usage errors not expressible as clap constraints
    #[error("{0}")]
    Usage(String),
}

/// Result type alias for Anchorage operations
pub type Result<T> = std::result::Result<T, Error>;
