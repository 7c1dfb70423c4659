//! Anchorage - address lease pool manager for virtual networks
//!
//! Tracks IPv4, IPv6 and MAC leases per network, with holds, owner-checked
//! allocation and atomic sub-pool reservations.

mod addr;
mod cli;
mod config;
mod error;
mod logging;
mod network;
mod ops;
mod pool;
mod range;
mod reserve;
mod store;
mod table;
mod template;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use addr::PoolAddr;
use cli::{Cli, Commands, NetworkAction};
use config::AnchorageConfig;
use error::{Error, Result};
use network::{NetworkId, VirtualNetwork};
use ops::LeasePool;
use range::{LeaseStatus, RangeDescriptor};
use store::Store;
use template::LeaseRequest;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    logging::enable_logger(cli.verbose);

    match cli.command {
        Commands::Completion { shell } => {
            cli::Cli::generate_completion(shell);
            Ok(())
        }
        Commands::Check => {
            config::load(&cli.config)?;
            println!("Configuration OK");
            Ok(())
        }
        command => {
            let config = config::load(&cli.config)?;
            let store = Arc::new(store::FsStore::open(&config.config.data_dir)?);
            let pool = LeasePool::new(store as Arc<dyn Store>);

            let rt = tokio::runtime::Runtime::new().map_err(Error::Io)?;
            rt.block_on(execute(command, &pool, &config))
        }
    }
}

async fn execute(command: Commands, pool: &LeasePool, config: &AnchorageConfig) -> Result<()> {
    match command {
        Commands::Network { action } => network_command(action, pool, config).await,

        Commands::Add {
            network,
            subnet,
            ip,
            size,
            file,
        } => {
            let range = range_from_args(subnet, ip, size, file.as_deref())?;
            pool.add_leases(NetworkId(network), &range).await?;
            println!("Added {} leases to network {}", range.size, network);
            Ok(())
        }

        Commands::Remove {
            network,
            addresses,
            file,
        } => {
            let addresses = addresses_from_args(&addresses, file.as_deref())?;
            pool.remove_leases(NetworkId(network), &addresses).await?;
            println!("Removed {} leases from network {}", addresses.len(), network);
            Ok(())
        }

        Commands::Hold {
            network,
            addresses,
            file,
        } => {
            let addresses = addresses_from_args(&addresses, file.as_deref())?;
            pool.hold_leases(NetworkId(network), &addresses).await?;
            println!("Held {} leases in network {}", addresses.len(), network);
            Ok(())
        }

        Commands::Release {
            network,
            addresses,
            file,
        } => {
            let addresses = addresses_from_args(&addresses, file.as_deref())?;
            pool.free_leases(NetworkId(network), &addresses).await?;
            println!("Released {} leases in network {}", addresses.len(), network);
            Ok(())
        }

        Commands::Reserve {
            network,
            count,
            file,
            kind,
            name,
            uid,
            gid,
        } => {
            let count = match (count, file) {
                (Some(count), _) => count,
                (None, Some(path)) => reservation_size(&path)?,
                (None, None) => {
                    return Err(Error::Usage(
                        "reserve needs --count or --file".to_string(),
                    ));
                }
            };
            let child = pool
                .reserve_leases(
                    NetworkId(network),
                    count,
                    kind,
                    uid.unwrap_or(config.defaults.owner_uid),
                    gid.unwrap_or(config.defaults.owner_gid),
                    name,
                )
                .await?;
            println!("{}", child);
            Ok(())
        }

        // Handled before the runtime starts.
        Commands::Check | Commands::Completion { .. } => Ok(()),
    }
}

async fn network_command(
    action: NetworkAction,
    pool: &LeasePool,
    config: &AnchorageConfig,
) -> Result<()> {
    match action {
        NetworkAction::Create {
            name,
            subnet,
            uid,
            gid,
        } => {
            let ranges = subnet
                .iter()
                .map(|s| parse_subnet(s))
                .collect::<Result<Vec<_>>>()?;
            let id = pool
                .create_network(
                    name,
                    uid.unwrap_or(config.defaults.owner_uid),
                    gid.unwrap_or(config.defaults.owner_gid),
                    &ranges,
                )
                .await?;
            println!("{}", id);
            Ok(())
        }

        NetworkAction::Show { network, json } => {
            let vn = pool.network_info(NetworkId(network)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&vn)?);
            } else {
                print_network(&vn);
            }
            Ok(())
        }

        NetworkAction::List { json } => {
            let mut networks = Vec::new();
            for id in pool.list_networks()? {
                networks.push(pool.network_info(id).await?);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&networks)?);
            } else {
                println!("{:<6} {:<24} {:<8} {:>6} {:>6} {:>6}", "ID", "NAME", "PARENT", "TOTAL", "USED", "HOLD");
                for vn in &networks {
                    let counts = vn.table.counts();
                    let parent = vn
                        .parent_id
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<6} {:<24} {:<8} {:>6} {:>6} {:>6}",
                        vn.id.0, vn.name, parent, counts.total, counts.used, counts.on_hold
                    );
                }
            }
            Ok(())
        }

        NetworkAction::Destroy { network } => {
            pool.destroy_network(NetworkId(network)).await?;
            println!("Destroyed network {}", network);
            Ok(())
        }
    }
}

/// Plain-text rendering of one network
fn print_network(vn: &VirtualNetwork) {
    let counts = vn.table.counts();
    println!("Network {} ({})", vn.id, vn.name);
    println!("  owner: uid {} gid {}", vn.owner_uid, vn.owner_gid);
    if let Some(parent) = vn.parent_id {
        println!("  reserved from: network {}", parent);
    }
    println!(
        "  leases: {} total, {} free, {} used, {} on hold",
        counts.total, counts.free, counts.used, counts.on_hold
    );
    for range in vn.table.ranges() {
        println!("  range {} ({}, {} addresses)", range.base(), range.kind(), range.len());
        for offset in range.offsets() {
            let Some(lease) = range.lease(offset) else {
                continue;
            };
            if lease.status == LeaseStatus::Free {
                continue;
            }
            let Some(addr) = range.addr_at(offset) else {
                continue;
            };
            let state = match lease.status {
                LeaseStatus::Used => "used",
                LeaseStatus::OnHold => "hold",
                LeaseStatus::Free => continue,
            };
            match lease.owner {
                Some(owner) => {
                    println!("    {:<40} {} (owner {})", addr.to_string(), state, owner)
                }
                None => println!("    {:<40} {}", addr.to_string(), state),
            }
        }
    }
}

/// Resolve a range from CLI arguments or a template file
fn range_from_args(
    subnet: Option<String>,
    ip: Option<String>,
    size: Option<u64>,
    file: Option<&Path>,
) -> Result<RangeDescriptor> {
    if let Some(path) = file {
        return match parse_template(path)? {
            LeaseRequest::Range(range) => Ok(range),
            _ => Err(Error::TemplateParseFailed(
                "expected an AR attribute".to_string(),
            )),
        };
    }
    if let Some(subnet) = subnet {
        return parse_subnet(&subnet);
    }
    if let (Some(ip), Some(size)) = (ip, size) {
        return Ok(RangeDescriptor::new(ip.parse()?, size));
    }
    Err(Error::Usage(
        "specify --subnet, --ip with --size, or --file".to_string(),
    ))
}

/// Resolve an address list from CLI arguments or a template file
fn addresses_from_args(addresses: &[String], file: Option<&Path>) -> Result<Vec<PoolAddr>> {
    if let Some(path) = file {
        return match parse_template(path)? {
            LeaseRequest::Addresses(addrs) => Ok(addrs),
            LeaseRequest::Range(range) => expand_range(&range),
            LeaseRequest::Count(_) => Err(Error::TemplateParseFailed(
                "expected LEASES or AR attributes, not a bare SIZE".to_string(),
            )),
        };
    }
    if addresses.is_empty() {
        return Err(Error::Usage("specify addresses or --file".to_string()));
    }
    addresses.iter().map(|s| s.parse()).collect()
}

/// Reservation size from a template file
fn reservation_size(path: &Path) -> Result<u64> {
    match parse_template(path)? {
        LeaseRequest::Count(count) => Ok(count),
        LeaseRequest::Range(range) => Ok(range.size),
        LeaseRequest::Addresses(_) => Err(Error::TemplateParseFailed(
            "reservations take a SIZE, not explicit addresses".to_string(),
        )),
    }
}

fn parse_template(path: &Path) -> Result<LeaseRequest> {
    let content = fs::read_to_string(path)?;
    template::parse_request(&content)
}

fn parse_subnet(subnet: &str) -> Result<RangeDescriptor> {
    let net = subnet
        .parse()
        .map_err(|_| Error::InvalidAddress(subnet.to_string()))?;
    RangeDescriptor::from_subnet(net)
}

/// Every address a descriptor covers
fn expand_range(range: &RangeDescriptor) -> Result<Vec<PoolAddr>> {
    (0..range.size)
        .map(|offset| {
            range.base.checked_add(offset).ok_or(Error::AddressOverflow {
                base: range.base,
                offset,
            })
        })
        .collect()
}
