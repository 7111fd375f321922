//! RAM-backed block device.
//!
//! `MemoryDisk` keeps the whole device in a byte vector and can be told to
//! fail or tear upcoming requests, which makes it the device of choice for
//! exercising power-loss and I/O-error paths.

use std::io;

use crate::{check_buffer, BlockError, BlockTransport, PartitionExtent, PartitionTable, BLOCK_SIZE};

#[derive(Debug, Clone, Default)]
struct Faults {
    fail_reads: bool,
    fail_next_write: bool,
    tear_next_write: Option<u32>,
}

/// A block device held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    bytes: Vec<u8>,
    table: PartitionTable,
    faults: Faults,
    writes: Vec<(u64, u32)>,
}

impl MemoryDisk {
    /// Creates a zero-filled device of `blocks` blocks with an empty table.
    pub fn new(blocks: u64) -> Self {
        Self {
            bytes: vec![0u8; blocks as usize * BLOCK_SIZE],
            table: PartitionTable::new(),
            faults: Faults::default(),
            writes: Vec::new(),
        }
    }

    /// Creates a device and parses `table` as its partition table.
    pub fn with_partitions(blocks: u64, table: &str) -> Result<Self, BlockError> {
        let mut disk = Self::new(blocks);
        disk.table = PartitionTable::parse(table, blocks)?;
        Ok(disk)
    }

    pub fn block_count(&self) -> u64 {
        (self.bytes.len() / BLOCK_SIZE) as u64
    }

    pub fn table(&self) -> &PartitionTable {
        &self.table
    }

    /// Raw view of the device contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable raw view, for planting or corrupting data in tests.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Byte range of `count` blocks at absolute `lba`.
    pub fn block_range(&self, lba: u64, count: u32) -> std::ops::Range<usize> {
        let start = lba as usize * BLOCK_SIZE;
        start..start + count as usize * BLOCK_SIZE
    }

    /// Every successful or torn write as `(lba, count)`, oldest first.
    pub fn writes(&self) -> &[(u64, u32)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Makes every read fail until [`MemoryDisk::heal`] is called.
    pub fn fail_reads(&mut self) {
        self.faults.fail_reads = true;
    }

    /// Makes the next write fail without touching the media.
    pub fn fail_next_write(&mut self) {
        self.faults.fail_next_write = true;
    }

    /// Makes the next write store only its first `blocks` blocks and then
    /// fail, as a power cut in the middle of the request would.
    pub fn tear_next_write(&mut self, blocks: u32) {
        self.faults.tear_next_write = Some(blocks);
    }

    /// Clears all pending faults.
    pub fn heal(&mut self) {
        self.faults = Faults::default();
    }

    fn check_range(&self, lba: u64, count: u32) -> Result<(), BlockError> {
        PartitionExtent::new(0, self.block_count())
            .absolute(lba, count)
            .map(|_| ())
    }
}

impl BlockTransport for MemoryDisk {
    fn resolve_partition(&mut self, name: &str) -> Result<PartitionExtent, BlockError> {
        self.table.resolve(name)
    }

    fn read_blocks(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BlockError> {
        check_buffer(count, out.len())?;
        self.check_range(lba, count)?;
        if self.faults.fail_reads {
            return Err(io::Error::other(format!("injected read failure at block {lba}")).into());
        }
        let range = self.block_range(lba, count);
        out.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write_blocks(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BlockError> {
        check_buffer(count, data.len())?;
        self.check_range(lba, count)?;
        if std::mem::take(&mut self.faults.fail_next_write) {
            return Err(io::Error::other(format!("injected write failure at block {lba}")).into());
        }
        if let Some(kept) = self.faults.tear_next_write.take() {
            let kept = kept.min(count);
            let range = self.block_range(lba, kept);
            self.bytes[range].copy_from_slice(&data[..kept as usize * BLOCK_SIZE]);
            self.writes.push((lba, kept));
            return Err(io::Error::other(format!(
                "injected power loss after {kept} of {count} blocks at block {lba}"
            ))
            .into());
        }
        let range = self.block_range(lba, count);
        self.bytes[range].copy_from_slice(data);
        self.writes.push((lba, count));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(fill: u8) -> Vec<u8> {
        vec![fill; BLOCK_SIZE]
    }

    #[test]
    fn basic_read_write_works() {
        let mut disk = MemoryDisk::new(8);
        disk.write_blocks(2, 1, &block(7)).unwrap();

        let mut out = vec![0u8; BLOCK_SIZE * 2];
        disk.read_blocks(1, 2, &mut out).unwrap();
        assert!(out[..BLOCK_SIZE].iter().all(|b| *b == 0));
        assert!(out[BLOCK_SIZE..].iter().all(|b| *b == 7));
        assert_eq!(disk.writes(), &[(2, 1)]);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut disk = MemoryDisk::new(4);
        let mut out = block(0);
        assert!(matches!(
            disk.read_blocks(4, 1, &mut out),
            Err(BlockError::OutOfRange { .. })
        ));
        assert!(disk.write_blocks(3, 2, &[0u8; BLOCK_SIZE * 2]).is_err());
    }

    #[test]
    fn resolves_partitions_from_table() {
        let mut disk = MemoryDisk::with_partitions(64, "32@0(a),-@32(b)").unwrap();
        assert_eq!(
            disk.resolve_partition("b").unwrap(),
            PartitionExtent::new(32, 32)
        );
        assert!(matches!(
            disk.resolve_partition("c"),
            Err(BlockError::PartitionNotFound { .. })
        ));
    }

    #[test]
    fn injected_read_failure() {
        let mut disk = MemoryDisk::new(4);
        disk.fail_reads();
        let mut out = block(0);
        assert!(disk.read_blocks(0, 1, &mut out).unwrap_err().is_io());
        disk.heal();
        disk.read_blocks(0, 1, &mut out).unwrap();
    }

    #[test]
    fn injected_write_failure_leaves_media_untouched() {
        let mut disk = MemoryDisk::new(4);
        disk.fail_next_write();
        assert!(disk.write_blocks(0, 1, &block(9)).unwrap_err().is_io());
        assert!(disk.bytes().iter().all(|b| *b == 0));
        assert!(disk.writes().is_empty());

        // The fault is one-shot.
        disk.write_blocks(0, 1, &block(9)).unwrap();
    }

    #[test]
    fn torn_write_keeps_only_leading_blocks() {
        let mut disk = MemoryDisk::new(4);
        disk.tear_next_write(1);
        let mut data = block(1);
        data.extend(block(2));
        data.extend(block(3));
        assert!(disk.write_blocks(0, 3, &data).is_err());

        assert!(disk.bytes()[disk.block_range(0, 1)].iter().all(|b| *b == 1));
        assert!(disk.bytes()[disk.block_range(1, 2)].iter().all(|b| *b == 0));
        assert_eq!(disk.writes(), &[(0, 1)]);
    }
}
