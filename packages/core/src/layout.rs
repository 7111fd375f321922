//! On-media layout of a vendor slot.
//!
//! Every slot is 128 blocks (64 KiB) and holds one complete image, all
//! fields little-endian:
//!
//! ```text
//! offset   size   field
//! 0        4      tag
//! 4        4      version
//! 8        2      next slot index
//! 10       2      item count
//! 12       2      free offset
//! 14       2      free size
//! 16       1008   item directory, 126 x {id, offset, size, flags}
//! 1024     64508  data
//! 65532    4      version2
//! ```

use vendor_storage_block::BLOCK_SIZE;

/// Magic marking a slot written by vendor storage.
pub const VENDOR_TAG: u32 = 0x524B_5644;

/// Number of redundant slots in the partition.
pub const SLOT_COUNT: u16 = 4;

/// Blocks occupied by one slot.
pub const SLOT_BLOCKS: u32 = 128;

pub const SLOT_SIZE: usize = SLOT_BLOCKS as usize * BLOCK_SIZE;

/// Capacity of the item directory.
pub const ITEM_MAX: usize = 126;

pub const ITEM_ENTRY_SIZE: usize = 8;

/// Payload offsets are multiples of this.
pub const ALIGNMENT: u16 = 64;

pub const HEADER_SIZE: usize = 16 + ITEM_MAX * ITEM_ENTRY_SIZE;

pub const TRAILER_SIZE: usize = 4;

/// Bytes available for item payloads.
pub const DATA_CAPACITY: usize = SLOT_SIZE - HEADER_SIZE - TRAILER_SIZE;

pub(crate) const TAG_OFFSET: usize = 0;
pub(crate) const VERSION_OFFSET: usize = 4;
pub(crate) const NEXT_SLOT_OFFSET: usize = 8;
pub(crate) const ITEM_COUNT_OFFSET: usize = 10;
pub(crate) const FREE_OFFSET_OFFSET: usize = 12;
pub(crate) const FREE_SIZE_OFFSET: usize = 14;
pub(crate) const DIRECTORY_OFFSET: usize = 16;
pub(crate) const DATA_OFFSET: usize = HEADER_SIZE;
pub(crate) const VERSION2_OFFSET: usize = SLOT_SIZE - TRAILER_SIZE;

const _: () = assert!(HEADER_SIZE == 1024);
const _: () = assert!(DATA_CAPACITY <= u16::MAX as usize);

/// First block of slot `index`, relative to the partition.
pub fn slot_lba(index: u16) -> u64 {
    u64::from(index) * u64::from(SLOT_BLOCKS)
}

/// Blocks a partition needs to hold every slot.
pub fn required_blocks() -> u64 {
    slot_lba(SLOT_COUNT)
}

/// Rounds `size` up to the payload alignment, or `None` if the result does
/// not fit the 16-bit size field.
pub fn align_up(size: u16) -> Option<u16> {
    size.checked_add(ALIGNMENT - 1).map(|s| s & !(ALIGNMENT - 1))
}

pub(crate) fn get_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

pub(crate) fn get_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub(crate) fn put_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// The three fields that decide whether a slot is usable, read from the
/// slot's first and last block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    pub tag: u32,
    pub version: u32,
    pub version2: u32,
}

impl SlotHeader {
    /// Decodes the header from the first and last block of a slot.
    pub fn from_blocks(first: &[u8; BLOCK_SIZE], last: &[u8; BLOCK_SIZE]) -> Self {
        Self {
            tag: get_u32(first, TAG_OFFSET),
            version: get_u32(first, VERSION_OFFSET),
            version2: get_u32(last, BLOCK_SIZE - TRAILER_SIZE),
        }
    }

    /// A slot is valid when the magic matches and both version copies agree.
    /// A write cut short by power loss leaves the trailing copy stale.
    /// Version 0 is never written, so a slot carrying it is ignored.
    pub fn is_valid(&self) -> bool {
        self.tag == VENDOR_TAG && self.version != 0 && self.version == self.version2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_constants_match_slot_size() {
        assert_eq!(SLOT_SIZE, 65536);
        assert_eq!(DATA_CAPACITY, 64508);
        assert_eq!(VERSION2_OFFSET, 65532);
        assert_eq!(DATA_OFFSET + DATA_CAPACITY + TRAILER_SIZE, SLOT_SIZE);
        assert_eq!(required_blocks(), 512);
        assert_eq!(slot_lba(3), 384);
    }

    #[test]
    fn align_up_rounds_to_64() {
        assert_eq!(align_up(0), Some(0));
        assert_eq!(align_up(1), Some(64));
        assert_eq!(align_up(64), Some(64));
        assert_eq!(align_up(65), Some(128));
        assert_eq!(align_up(u16::MAX - 63), Some(u16::MAX - 63));
        assert_eq!(align_up(u16::MAX - 62), None);
        assert_eq!(align_up(u16::MAX), None);
    }

    #[test]
    fn header_validity() {
        let mut first = [0u8; BLOCK_SIZE];
        let mut last = [0u8; BLOCK_SIZE];
        put_u32(&mut first, TAG_OFFSET, VENDOR_TAG);
        put_u32(&mut first, VERSION_OFFSET, 9);
        put_u32(&mut last, BLOCK_SIZE - TRAILER_SIZE, 9);

        let header = SlotHeader::from_blocks(&first, &last);
        assert_eq!(header.version, 9);
        assert!(header.is_valid());

        put_u32(&mut last, BLOCK_SIZE - TRAILER_SIZE, 8);
        assert!(!SlotHeader::from_blocks(&first, &last).is_valid());

        put_u32(&mut last, BLOCK_SIZE - TRAILER_SIZE, 9);
        put_u32(&mut first, TAG_OFFSET, 0xFFFF_FFFF);
        assert!(!SlotHeader::from_blocks(&first, &last).is_valid());
    }

    #[test]
    fn erased_slot_is_invalid() {
        let blank = [0u8; BLOCK_SIZE];
        assert!(!SlotHeader::from_blocks(&blank, &blank).is_valid());
    }

    #[test]
    fn version_zero_is_invalid() {
        let mut first = [0u8; BLOCK_SIZE];
        let last = [0u8; BLOCK_SIZE];
        put_u32(&mut first, TAG_OFFSET, VENDOR_TAG);
        let header = SlotHeader::from_blocks(&first, &last);
        assert_eq!((header.version, header.version2), (0, 0));
        assert!(!header.is_valid());
    }
}
