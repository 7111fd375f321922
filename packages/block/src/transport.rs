//! Core traits for the block layer.

use crate::BlockError;

/// Size of one addressable block in bytes.
pub const BLOCK_SIZE: usize = 512;

/// A contiguous, block-addressed region of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionExtent {
    /// First block of the region, absolute on the device.
    pub base: u64,
    /// Length of the region in blocks.
    pub blocks: u64,
}

impl PartitionExtent {
    pub fn new(base: u64, blocks: u64) -> Self {
        Self { base, blocks }
    }

    /// One past the last block of the region, or `None` if that does not
    /// fit in a block address.
    pub fn end(&self) -> Option<u64> {
        self.base.checked_add(self.blocks)
    }

    pub fn overlaps(&self, other: &PartitionExtent) -> bool {
        let end = |e: &PartitionExtent| e.end().unwrap_or(u64::MAX);
        self.base < end(other) && other.base < end(self)
    }

    /// Translates a region-relative request into an absolute block address.
    ///
    /// Fails with [`BlockError::OutOfRange`] if any block of the request lies
    /// past the end of the region.
    pub fn absolute(&self, lba: u64, count: u32) -> Result<u64, BlockError> {
        let start = match lba.checked_add(u64::from(count)) {
            Some(end) if end <= self.blocks => self.base.checked_add(lba),
            _ => None,
        };
        start.ok_or(BlockError::OutOfRange {
            lba,
            count,
            limit: self.blocks,
        })
    }
}

/// Checks that a buffer holds exactly `count` blocks.
pub fn check_buffer(count: u32, len: usize) -> Result<(), BlockError> {
    let expected = count as usize * BLOCK_SIZE;
    if len != expected {
        return Err(BlockError::BufferSize {
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// Block-addressed access to a storage device.
///
/// All addresses are absolute block numbers on the device and all buffers
/// are exactly `count * BLOCK_SIZE` bytes long. Calls block until the device
/// has completed the request; there is no timeout and no retry.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Box<dyn BlockTransport>`.
pub trait BlockTransport: Send + Sync {
    /// Maps a partition name to its extent on the device.
    fn resolve_partition(&mut self, name: &str) -> Result<PartitionExtent, BlockError>;

    /// Reads `count` blocks starting at `lba` into `out`.
    fn read_blocks(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BlockError>;

    /// Writes `count` blocks starting at `lba` from `data`.
    ///
    /// Returns only once the data is durable as far as the device can tell.
    fn write_blocks(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BlockError>;
}

// Blanket implementations for references and boxes

impl<T: BlockTransport + ?Sized> BlockTransport for &mut T {
    fn resolve_partition(&mut self, name: &str) -> Result<PartitionExtent, BlockError> {
        (**self).resolve_partition(name)
    }

    fn read_blocks(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BlockError> {
        (**self).read_blocks(lba, count, out)
    }

    fn write_blocks(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BlockError> {
        (**self).write_blocks(lba, count, data)
    }
}

impl<T: BlockTransport + ?Sized> BlockTransport for Box<T> {
    fn resolve_partition(&mut self, name: &str) -> Result<PartitionExtent, BlockError> {
        self.as_mut().resolve_partition(name)
    }

    fn read_blocks(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BlockError> {
        self.as_mut().read_blocks(lba, count, out)
    }

    fn write_blocks(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BlockError> {
        self.as_mut().write_blocks(lba, count, data)
    }
}

/// A transport bound to one named partition.
///
/// Requests are partition-relative and bounds-checked against the resolved
/// extent before they reach the device.
#[derive(Debug)]
pub struct Partition<T> {
    transport: T,
    name: String,
    extent: PartitionExtent,
}

impl<T: BlockTransport> Partition<T> {
    /// Resolves `name` through `transport` and binds the result.
    pub fn open(mut transport: T, name: &str) -> Result<Self, BlockError> {
        let extent = transport.resolve_partition(name)?;
        tracing::debug!(
            partition = name,
            base = extent.base,
            blocks = extent.blocks,
            "resolved partition"
        );
        Ok(Self {
            transport,
            name: name.to_string(),
            extent,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extent(&self) -> PartitionExtent {
        self.extent
    }

    pub fn read(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BlockError> {
        check_buffer(count, out.len())?;
        let absolute = self.extent.absolute(lba, count)?;
        self.transport.read_blocks(absolute, count, out)
    }

    pub fn write(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BlockError> {
        check_buffer(count, data.len())?;
        let absolute = self.extent.absolute(lba, count)?;
        self.transport.write_blocks(absolute, count, data)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A one-partition transport that records the absolute addresses it sees.
    struct RecordingTransport {
        extent: PartitionExtent,
        seen: Vec<(u64, u32)>,
    }

    impl BlockTransport for RecordingTransport {
        fn resolve_partition(&mut self, name: &str) -> Result<PartitionExtent, BlockError> {
            if name == "vnvm" {
                Ok(self.extent)
            } else {
                Err(BlockError::PartitionNotFound {
                    name: name.to_string(),
                })
            }
        }

        fn read_blocks(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BlockError> {
            self.seen.push((lba, count));
            out.fill(0xAB);
            Ok(())
        }

        fn write_blocks(&mut self, lba: u64, count: u32, _data: &[u8]) -> Result<(), BlockError> {
            self.seen.push((lba, count));
            Ok(())
        }
    }

    fn transport() -> RecordingTransport {
        RecordingTransport {
            extent: PartitionExtent::new(100, 16),
            seen: Vec::new(),
        }
    }

    #[test]
    fn extent_absolute_checks_bounds() {
        let extent = PartitionExtent::new(100, 16);
        assert_eq!(extent.absolute(0, 16).unwrap(), 100);
        assert_eq!(extent.absolute(15, 1).unwrap(), 115);
        assert!(matches!(
            extent.absolute(15, 2),
            Err(BlockError::OutOfRange { lba: 15, count: 2, limit: 16 })
        ));
        assert!(extent.absolute(u64::MAX, 1).is_err());
    }

    #[test]
    fn extent_overlap() {
        let a = PartitionExtent::new(0, 10);
        assert!(a.overlaps(&PartitionExtent::new(9, 1)));
        assert!(!a.overlaps(&PartitionExtent::new(10, 5)));

        let top = PartitionExtent::new(u64::MAX - 1, 4);
        assert_eq!(top.end(), None);
        assert!(top.overlaps(&PartitionExtent::new(u64::MAX - 1, 1)));
        assert!(!top.overlaps(&a));
    }

    #[test]
    fn extent_absolute_never_wraps() {
        let top = PartitionExtent::new(u64::MAX, 4);
        assert!(matches!(
            top.absolute(2, 1),
            Err(BlockError::OutOfRange { lba: 2, count: 1, limit: 4 })
        ));
    }

    #[test]
    fn partition_translates_relative_addresses() {
        let mut partition = Partition::open(transport(), "vnvm").unwrap();
        let mut buf = vec![0u8; BLOCK_SIZE * 2];
        partition.read(3, 2, &mut buf).unwrap();
        partition.write(0, 1, &buf[..BLOCK_SIZE]).unwrap();
        assert_eq!(partition.transport().seen, vec![(103, 2), (100, 1)]);
        assert!(buf.iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn partition_rejects_wrong_buffer_size() {
        let mut partition = Partition::open(transport(), "vnvm").unwrap();
        let mut buf = vec![0u8; 10];
        assert!(matches!(
            partition.read(0, 1, &mut buf),
            Err(BlockError::BufferSize { expected: 512, actual: 10 })
        ));
        assert!(partition.transport().seen.is_empty());
    }

    #[test]
    fn partition_open_unknown_name_fails() {
        let result = Partition::open(transport(), "misc");
        assert!(matches!(result, Err(BlockError::PartitionNotFound { .. })));
    }

    #[test]
    fn box_dyn_works() {
        let mut boxed: Box<dyn BlockTransport> = Box::new(transport());
        let extent = boxed.resolve_partition("vnvm").unwrap();
        assert_eq!(extent.blocks, 16);

        let mut partition = Partition::open(&mut boxed, "vnvm").unwrap();
        partition.write(1, 1, &[0u8; BLOCK_SIZE]).unwrap();
    }
}
