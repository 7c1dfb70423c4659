//! Command-line interface for Anchorage
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::addr::AddrKind;

/// Anchorage - address lease pool manager for virtual networks
#[derive(Parser)]
#[command(name = "anchorage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "anchorage.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Network management
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },

    /// Add a range of leases to a network
    Add {
        /// Network id
        network: u32,

        /// Subnet in CIDR notation (e.g., 10.0.1.0/24)
        #[arg(short, long, conflicts_with_all = ["ip", "file"])]
        subnet: Option<String>,

        /// First address of the range
        #[arg(long, requires = "size", conflicts_with = "file")]
        ip: Option<String>,

        /// Number of consecutive addresses
        #[arg(long)]
        size: Option<u64>,

        /// Template file describing the range
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Remove unused leases from a network
    Remove {
        /// Network id
        network: u32,

        /// Addresses to remove
        addresses: Vec<String>,

        /// Template file listing the addresses
        #[arg(short, long, conflicts_with = "addresses")]
        file: Option<PathBuf>,
    },

    /// Hold free addresses so they cannot be allocated
    Hold {
        /// Network id
        network: u32,

        /// Addresses to hold
        addresses: Vec<String>,

        /// Template file listing the addresses
        #[arg(short, long, conflicts_with = "addresses")]
        file: Option<PathBuf>,
    },

    /// Release held addresses back to the free pool
    Release {
        /// Network id
        network: u32,

        /// Addresses to release
        addresses: Vec<String>,

        /// Template file listing the addresses
        #[arg(short, long, conflicts_with = "addresses")]
        file: Option<PathBuf>,
    },

    /// Reserve addresses into a new network
    Reserve {
        /// Source network id
        network: u32,

        /// Number of addresses to reserve
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Template file with a SIZE attribute
        #[arg(short, long, conflicts_with = "count")]
        file: Option<PathBuf>,

        /// Address family (IP4, IP6 or ETHER)
        #[arg(short, long, default_value = "IP4")]
        kind: AddrKind,

        /// Name for the reservation network
        #[arg(long)]
        name: Option<String>,

        /// Owner user id (defaults from config)
        #[arg(long)]
        uid: Option<u32>,

        /// Owner group id (defaults from config)
        #[arg(long)]
        gid: Option<u32>,
    },

    /// Validate configuration
    Check,

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Actions for the network command
#[derive(Subcommand)]
pub enum NetworkAction {
    /// Create a new network
    Create {
        /// Network name
        name: String,

        /// Subnets in CIDR notation (repeatable)
        #[arg(short, long)]
        subnet: Vec<String>,

        /// Owner user id (defaults from config)
        #[arg(long)]
        uid: Option<u32>,

        /// Owner group id (defaults from config)
        #[arg(long)]
        gid: Option<u32>,
    },

    /// Show one network's leases and counters
    Show {
        /// Network id
        network: u32,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List all networks
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Destroy a network with no used leases
    Destroy {
        /// Network id
        network: u32,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "anchorage", &mut std::io::stdout());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_reserve() {
        let cli = Cli::try_parse_from([
            "anchorage", "reserve", "3", "-n", "4", "--kind", "IP6", "--uid", "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Reserve {
                network,
                count,
                kind,
                uid,
                ..
            } => {
                assert_eq!(network, 3);
                assert_eq!(count, Some(4));
                assert_eq!(kind, AddrKind::Ipv6);
                assert_eq!(uid, Some(7));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_cli_rejects_addresses_with_file() {
        let result = Cli::try_parse_from([
            "anchorage",
            "hold",
            "1",
            "10.0.0.1",
            "--file",
            "leases.tpl",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_network_create() {
        let cli = Cli::try_parse_from([
            "anchorage",
            "network",
            "create",
            "backend",
            "-s",
            "10.0.1.0/24",
            "-s",
            "fd00::/120",
        ])
        .unwrap();
        match cli.command {
            Commands::Network {
                action: NetworkAction::Create { name, subnet, .. },
            } => {
                assert_eq!(name, "backend");
                assert_eq!(subnet.len(), 2);
            }
            _ => panic!("wrong command"),
        }
    }
}
