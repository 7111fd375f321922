//! Error types for the vendor store.

use vendor_storage_block::BlockError;

/// Errors returned by [`VendorStore`](crate::VendorStore) operations.
///
/// Nothing is retried internally; every failure goes straight back to the
/// caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The block device is missing or unusable.
    #[error("block device unavailable: {0}")]
    DeviceUnavailable(#[source] BlockError),

    #[error("partition {name:?} not found")]
    PartitionNotFound { name: String },

    #[error("partition {name:?} has {blocks} blocks but vendor storage needs {required}")]
    PartitionTooSmall {
        name: String,
        blocks: u64,
        required: u64,
    },

    /// A read or write of a slot failed.
    ///
    /// A failed write leaves the in-memory image ahead of the media; reload
    /// the store before writing again.
    #[error("I/O failure on slot {slot}: {source}")]
    Io {
        slot: u16,
        #[source]
        source: BlockError,
    },

    #[error("item {id:#06x} not found")]
    NotFound { id: u16 },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("item {id:#06x} needs {needed} bytes but only {free} are free")]
    OutOfSpace { id: u16, needed: u16, free: u16 },

    #[error("item directory is full ({max} entries)")]
    DirectoryFull { max: usize },

    #[error("version counter exhausted")]
    VersionExhausted,

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    /// Maps a transport error raised while touching `slot`.
    pub(crate) fn slot_io(slot: u16, source: BlockError) -> Self {
        match source {
            BlockError::DeviceUnavailable { .. } => Error::DeviceUnavailable(source),
            BlockError::PartitionNotFound { name } => Error::PartitionNotFound { name },
            source => Error::Io { slot, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<BlockError> for Error {
    fn from(source: BlockError) -> Self {
        match source {
            BlockError::DeviceUnavailable { .. } => Error::DeviceUnavailable(source),
            BlockError::PartitionNotFound { name } => Error::PartitionNotFound { name },
            BlockError::PartitionTable { message } => Error::Config { message },
            source => Error::Io { slot: 0, source },
        }
    }
}
