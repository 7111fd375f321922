//! Error types for the block transport layer.
//!
//! Errors at this level describe the device and its addressing only. Item
//! semantics (unknown ids, full directories) belong to the store above.

/// Errors raised by a [`BlockTransport`](crate::BlockTransport).
#[derive(thiserror::Error, Debug)]
pub enum BlockError {
    /// The backing device is missing or cannot be opened.
    #[error("block device {device} is unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    /// No partition with this name exists on the device.
    #[error("partition {name:?} not found")]
    PartitionNotFound { name: String },

    /// The request addresses blocks outside the device or partition.
    #[error("blocks {lba}..{lba}+{count} are outside a region of {limit} blocks")]
    OutOfRange { lba: u64, count: u32, limit: u64 },

    /// The caller's buffer does not hold exactly `count` blocks.
    #[error("buffer of {actual} bytes does not match the expected {expected} bytes")]
    BufferSize { expected: usize, actual: usize },

    /// The partition table could not be parsed or is inconsistent.
    #[error("invalid partition table: {message}")]
    PartitionTable { message: String },

    /// Read or write failure reported by the device.
    #[error("block I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlockError {
    pub(crate) fn table(message: impl Into<String>) -> Self {
        BlockError::PartitionTable {
            message: message.into(),
        }
    }

    /// Returns true for failures of the device itself rather than of the
    /// caller's addressing.
    pub fn is_io(&self) -> bool {
        matches!(self, BlockError::Io(_))
    }
}
