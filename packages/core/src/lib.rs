//! Vendor storage: a redundant, versioned key-value store on a raw partition.
//!
//! Small binary items (serial numbers, MAC addresses, keys) are kept in an
//! image that mirrors one 64 KiB slot of the partition. The partition holds
//! four slots; every write stores the complete image in the next slot, so
//! the previous copy survives a power cut mid-write:
//!
//! - `version`/`version2` at opposite ends of the slot mark a complete write
//! - recovery loads the valid slot with the highest version
//! - payloads are bump-allocated in 64-byte steps and never reclaimed
//!
//! # Example
//!
//! ```rust
//! use vendor_storage_block::MemoryDisk;
//! use vendor_storage_core::{ids, StoreConfig, VendorStore};
//!
//! let disk = MemoryDisk::with_partitions(2048, "0x200@0x400(vnvm)").unwrap();
//! let mut store = VendorStore::initialize(disk, StoreConfig::new("vnvm")).unwrap();
//!
//! store.write(ids::SERIAL_NUMBER, b"RK3588-000042").unwrap();
//!
//! let mut buf = [0u8; 64];
//! let len = store.read(ids::SERIAL_NUMBER, &mut buf).unwrap();
//! assert_eq!(&buf[..len], b"RK3588-000042");
//! ```

pub use bytes::Bytes;

mod config;
mod error;
pub mod ids;
mod image;
pub mod layout;
mod shared;
mod store;

pub use config::{GrowPolicy, StoreConfig};
pub use error::Error;
pub use image::{ImageError, ItemEntry, Upsert, VendorImage};
pub use shared::SharedVendorStore;
pub use store::{StoreStatus, VendorStore};

// Re-export the transport layer for convenience
pub use vendor_storage_block::{BlockError, BlockTransport, FileDisk, MemoryDisk, Partition};
