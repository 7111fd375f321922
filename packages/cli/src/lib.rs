//! The `vendorstore` command-line tool.
//!
//! Opens a disk image, recovers the vendor store from the configured
//! partition and reads, writes or lists items.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};
use vendor_storage_block::{BlockError, FileDisk, PartitionTable};
use vendor_storage_core::{ids, GrowPolicy, VendorStore};

pub mod config;

use config::{CliConfig, Target};

/// Log filter used when `RUST_LOG` is unset: warnings everywhere, plus the
/// store's recovery summary.
pub const DEFAULT_LOG_FILTER: &str = "warn,vendor_storage_core=info";

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Store error: {0}")]
    Store(#[from] vendor_storage_core::Error),

    #[error("Device error: {0}")]
    Block(#[from] BlockError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("No disk image given; pass --disk or set \"disk\" in the config file")]
    MissingDisk,
}

/// vendorstore - inspect and edit vendor storage in disk images
#[derive(Parser, Debug)]
#[command(name = "vendorstore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON config file with disk, partitions, partition and grow_policy
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Disk image file
    #[arg(long, global = true)]
    pub disk: Option<PathBuf>,

    /// Partition table, e.g. "0x200@0x4000(vnvm)"
    #[arg(long, global = true)]
    pub partitions: Option<String>,

    /// Name of the vendor partition
    #[arg(long, global = true)]
    pub partition: Option<String>,

    /// What to do when an item outgrows its allocation: reject or overwrite
    #[arg(long, global = true, value_parser = parse_grow_policy)]
    pub grow_policy: Option<GrowPolicy>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a zero-filled disk image
    Create {
        /// Size of the image in 512-byte blocks
        #[arg(long)]
        blocks: u64,
    },
    /// Show the recovered store state
    Info,
    /// List stored items
    List,
    /// Print one item
    Read {
        /// Item id: decimal, 0x hex, or a well-known name such as wifi-mac
        #[arg(long, value_parser = parse_id)]
        id: u16,
        /// Print the payload as hex
        #[arg(long)]
        hex: bool,
        /// Write the raw payload to this file instead of printing it
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Insert or replace one item
    #[command(group(ArgGroup::new("payload").required(true).args(["hex", "text", "file"])))]
    Write {
        /// Item id: decimal, 0x hex, or a well-known name such as wifi-mac
        #[arg(long, value_parser = parse_id)]
        id: u16,
        #[arg(long)]
        hex: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn parse_id(text: &str) -> Result<u16, String> {
    ids::parse(text).ok_or_else(|| format!("invalid item id {text:?}"))
}

fn parse_grow_policy(text: &str) -> Result<GrowPolicy, String> {
    match text {
        "reject" => Ok(GrowPolicy::Reject),
        "overwrite" => Ok(GrowPolicy::Overwrite),
        _ => Err(format!("unknown grow policy {text:?}, expected reject or overwrite")),
    }
}

impl Cli {
    fn target(&self) -> Result<Target, CliError> {
        let file = match &self.config {
            Some(path) => CliConfig::from_file(path)?,
            None => CliConfig::default(),
        };
        let flags = CliConfig {
            disk: self.disk.clone(),
            partitions: self.partitions.clone(),
            partition: self.partition.clone(),
            grow_policy: self.grow_policy,
        };
        file.merge(flags).resolve()
    }
}

fn open_store(target: &Target) -> Result<VendorStore<FileDisk>, CliError> {
    let disk = FileDisk::open(&target.disk, &target.partitions)?;
    Ok(VendorStore::initialize(disk, target.store.clone())?)
}

/// Runs one command, writing its report to `out`.
pub fn execute(cli: &Cli, out: &mut dyn Write) -> Result<(), CliError> {
    let target = cli.target()?;
    tracing::debug!(?target, "resolved target");

    match &cli.command {
        Command::Create { blocks } => {
            PartitionTable::parse(&target.partitions, *blocks)?.resolve(&target.store.partition)?;
            let disk = FileDisk::create(&target.disk, *blocks, &target.partitions)?;
            writeln!(
                out,
                "created {} ({} blocks, partitions {})",
                target.disk.display(),
                disk.block_count(),
                disk.table()
            )?;
        }
        Command::Info => {
            let store = open_store(&target)?;
            let status = store.status();
            let extent = store.partition().extent();
            writeln!(out, "partition:   {}", target.store.partition)?;
            writeln!(out, "extent:      {:#x}@{:#x}", extent.blocks, extent.base)?;
            writeln!(out, "version:     {}", status.version)?;
            match status.active_slot {
                Some(slot) => writeln!(out, "active slot: {}", slot)?,
                None => writeln!(out, "active slot: none (empty store)")?,
            }
            writeln!(out, "next slot:   {}", status.next_slot)?;
            writeln!(out, "items:       {}", status.item_count)?;
            writeln!(
                out,
                "free:        {} bytes at offset {}",
                status.free_size, status.free_offset
            )?;
        }
        Command::List => {
            let store = open_store(&target)?;
            for item in store.items() {
                let name = ids::name(item.id).unwrap_or("-");
                writeln!(
                    out,
                    "{:#06x}  {:<14} offset={:<6} size={}",
                    item.id, name, item.offset, item.size
                )?;
            }
        }
        Command::Read {
            id,
            hex: as_hex,
            out: path,
        } => {
            let store = open_store(&target)?;
            let payload = store.get(*id)?;
            if let Some(path) = path {
                std::fs::write(path, &payload)?;
            } else if *as_hex {
                writeln!(out, "{}", hex::encode(&payload))?;
            } else {
                match std::str::from_utf8(&payload) {
                    Ok(text) => writeln!(out, "{}", text)?,
                    Err(_) => writeln!(out, "{}", hex::encode(&payload))?,
                }
            }
        }
        Command::Write {
            id,
            hex: hex_payload,
            text,
            file,
        } => {
            let payload = match (hex_payload, text, file) {
                (Some(encoded), _, _) => hex::decode(encoded.trim())?,
                (_, Some(text), _) => text.clone().into_bytes(),
                (_, _, Some(path)) => std::fs::read(path)?,
                (None, None, None) => {
                    return Err(CliError::Config {
                        message: "no payload given".to_string(),
                    });
                }
            };
            let mut store = open_store(&target)?;
            store.write(*id, &payload)?;
            let status = store.status();
            writeln!(
                out,
                "wrote {} bytes to item {:#06x} (version {}, slot {})",
                payload.len(),
                id,
                status.version,
                status.active_slot.unwrap_or_default()
            )?;
        }
    }
    Ok(())
}
