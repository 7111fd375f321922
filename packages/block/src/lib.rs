//! Block transport for vendor storage.
//!
//! This is the layer under the vendor store: fixed-size blocks, named
//! partitions and nothing else. The store never touches a device directly;
//! it goes through a [`BlockTransport`], usually wrapped in a [`Partition`]
//! so every request is partition-relative and bounds-checked.
//!
//! Two devices ship with the crate:
//! - [`MemoryDisk`] for tests and tooling, with fault injection
//! - [`FileDisk`] for disk image files
//!
//! # Example
//!
//! ```rust
//! use vendor_storage_block::{MemoryDisk, Partition, BLOCK_SIZE};
//!
//! let disk = MemoryDisk::with_partitions(1024, "0x200@0x100(vnvm)").unwrap();
//! let mut vnvm = Partition::open(disk, "vnvm").unwrap();
//!
//! vnvm.write(0, 1, &[0x42; BLOCK_SIZE]).unwrap();
//! let mut block = [0u8; BLOCK_SIZE];
//! vnvm.read(0, 1, &mut block).unwrap();
//! assert_eq!(block[0], 0x42);
//! ```

mod error;
mod file;
mod memory;
mod table;
mod transport;

pub use error::BlockError;
pub use file::FileDisk;
pub use memory::MemoryDisk;
pub use table::PartitionTable;
pub use transport::{check_buffer, BlockTransport, Partition, PartitionExtent, BLOCK_SIZE};
