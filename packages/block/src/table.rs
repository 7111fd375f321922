//! Named partition tables.
//!
//! A table is written as a comma-separated list of `size@offset(name)`
//! entries, with sizes and offsets counted in blocks:
//!
//! ```text
//! 0x2000@0x2000(uboot),0x80@0x4000(vnvm),-@0x8000(userdata)
//! ```
//!
//! Numbers are decimal or `0x`-prefixed hex. A size of `-` extends the
//! partition to the end of the device.

use crate::{BlockError, PartitionExtent};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    entries: Vec<(String, PartitionExtent)>,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a table description for a device of `device_blocks` blocks.
    pub fn parse(text: &str, device_blocks: u64) -> Result<Self, BlockError> {
        let mut table = PartitionTable::new();
        for entry in text.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, extent) = parse_entry(entry, device_blocks)?;
            table.add(name, extent, device_blocks)?;
        }
        Ok(table)
    }

    /// Adds a partition, rejecting duplicates, overlaps and extents that run
    /// past the end of the device.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        extent: PartitionExtent,
        device_blocks: u64,
    ) -> Result<(), BlockError> {
        let name = name.into();
        if name.is_empty() {
            return Err(BlockError::table("partition name must not be empty"));
        }
        if extent.blocks == 0 {
            return Err(BlockError::table(format!("partition {name:?} is empty")));
        }
        let end = extent.end().ok_or_else(|| {
            BlockError::table(format!("partition {name:?} overflows the block address space"))
        })?;
        if end > device_blocks {
            return Err(BlockError::table(format!(
                "partition {name:?} ends at block {end} past the device end {device_blocks}"
            )));
        }
        for (existing, other) in &self.entries {
            if *existing == name {
                return Err(BlockError::table(format!("duplicate partition {name:?}")));
            }
            if other.overlaps(&extent) {
                return Err(BlockError::table(format!(
                    "partition {name:?} overlaps {existing:?}"
                )));
            }
        }
        self.entries.push((name, extent));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<PartitionExtent> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, extent)| *extent)
    }

    /// Looks up `name`, failing with [`BlockError::PartitionNotFound`].
    pub fn resolve(&self, name: &str) -> Result<PartitionExtent, BlockError> {
        self.get(name).ok_or_else(|| BlockError::PartitionNotFound {
            name: name.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PartitionExtent)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), *e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Display for PartitionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (name, extent)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{:#x}@{:#x}({})", extent.blocks, extent.base, name)?;
        }
        Ok(())
    }
}

fn parse_entry(entry: &str, device_blocks: u64) -> Result<(String, PartitionExtent), BlockError> {
    let malformed = || BlockError::table(format!("malformed entry {entry:?}"));

    let (size, rest) = entry.split_once('@').ok_or_else(malformed)?;
    let (offset, name) = rest.split_once('(').ok_or_else(malformed)?;
    let name = name.strip_suffix(')').ok_or_else(malformed)?;

    let base = parse_number(offset.trim()).ok_or_else(malformed)?;
    let blocks = match size.trim() {
        "-" => device_blocks.checked_sub(base).ok_or_else(|| {
            BlockError::table(format!(
                "partition {name:?} starts past the device end {device_blocks}"
            ))
        })?,
        size => parse_number(size).ok_or_else(malformed)?,
    };
    if base.checked_add(blocks).is_none() {
        return Err(BlockError::table(format!(
            "partition {name:?} overflows the block address space"
        )));
    }

    Ok((name.to_string(), PartitionExtent::new(base, blocks)))
}

fn parse_number(text: &str) -> Option<u64> {
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
