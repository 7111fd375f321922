//! The in-memory image of one vendor slot.

use crate::layout::{
    align_up, get_u16, get_u32, put_u16, put_u32, SlotHeader, ALIGNMENT, DATA_CAPACITY,
    DATA_OFFSET, DIRECTORY_OFFSET, FREE_OFFSET_OFFSET, FREE_SIZE_OFFSET, ITEM_COUNT_OFFSET,
    ITEM_ENTRY_SIZE, ITEM_MAX, NEXT_SLOT_OFFSET, SLOT_COUNT, SLOT_SIZE, TAG_OFFSET, VENDOR_TAG,
    VERSION2_OFFSET, VERSION_OFFSET,
};
use crate::{Error, GrowPolicy};

/// One entry of the item directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemEntry {
    pub id: u16,
    /// Start of the payload within the data region.
    pub offset: u16,
    /// Payload length in bytes, unaligned.
    pub size: u16,
    pub flags: u16,
}

/// Reasons a fully read slot is refused even though its header is valid.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("slot image is {0} bytes")]
    Length(usize),
    #[error("tag or version mirror mismatch")]
    Header,
    #[error("item count {0} exceeds the directory")]
    ItemCount(u16),
    #[error("free region {offset}+{size} does not end at the data capacity")]
    FreeRegion { offset: u16, size: u16 },
    #[error("item {id:#06x} at {offset} is misplaced")]
    ItemOffset { id: u16, offset: u16 },
    #[error("item {id:#06x} runs past the data region")]
    ItemBounds { id: u16 },
    #[error("item {id:#06x} appears twice")]
    DuplicateId { id: u16 },
}

/// Outcome of a successful [`VendorImage::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// A complete vendor slot held in memory.
///
/// The directory and the data region are fixed-size, exactly as on media.
/// The tag is implied and `version2` always mirrors `version`; both are
/// materialized by [`VendorImage::to_bytes`].
#[derive(Clone)]
pub struct VendorImage {
    version: u32,
    next_slot: u16,
    item_count: u16,
    free_offset: u16,
    free_size: u16,
    items: [ItemEntry; ITEM_MAX],
    data: Box<[u8]>,
}

impl VendorImage {
    /// An empty image at version 1, targeting slot 0.
    pub fn fresh() -> Self {
        Self {
            version: 1,
            next_slot: 0,
            item_count: 0,
            free_offset: 0,
            free_size: DATA_CAPACITY as u16,
            items: [ItemEntry::default(); ITEM_MAX],
            data: vec![0u8; DATA_CAPACITY].into_boxed_slice(),
        }
    }

    /// Decodes a full slot, refusing images whose header is invalid or whose
    /// directory is inconsistent with the allocator state.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() != SLOT_SIZE {
            return Err(ImageError::Length(bytes.len()));
        }
        let header = SlotHeader {
            tag: get_u32(bytes, TAG_OFFSET),
            version: get_u32(bytes, VERSION_OFFSET),
            version2: get_u32(bytes, VERSION2_OFFSET),
        };
        if !header.is_valid() {
            return Err(ImageError::Header);
        }

        let item_count = get_u16(bytes, ITEM_COUNT_OFFSET);
        if item_count as usize > ITEM_MAX {
            return Err(ImageError::ItemCount(item_count));
        }
        let free_offset = get_u16(bytes, FREE_OFFSET_OFFSET);
        let free_size = get_u16(bytes, FREE_SIZE_OFFSET);
        if free_offset as usize + free_size as usize != DATA_CAPACITY
            || free_offset % ALIGNMENT != 0
        {
            return Err(ImageError::FreeRegion {
                offset: free_offset,
                size: free_size,
            });
        }

        let mut items = [ItemEntry::default(); ITEM_MAX];
        for (i, item) in items.iter_mut().enumerate().take(item_count as usize) {
            let at = DIRECTORY_OFFSET + i * ITEM_ENTRY_SIZE;
            *item = ItemEntry {
                id: get_u16(bytes, at),
                offset: get_u16(bytes, at + 2),
                size: get_u16(bytes, at + 4),
                flags: get_u16(bytes, at + 6),
            };
        }

        let live = &items[..item_count as usize];
        let mut previous = 0u16;
        for (i, item) in live.iter().enumerate() {
            if item.offset % ALIGNMENT != 0 || item.offset < previous || item.offset > free_offset
            {
                return Err(ImageError::ItemOffset {
                    id: item.id,
                    offset: item.offset,
                });
            }
            if item.offset as usize + item.size as usize > DATA_CAPACITY {
                return Err(ImageError::ItemBounds { id: item.id });
            }
            if live[..i].iter().any(|other| other.id == item.id) {
                return Err(ImageError::DuplicateId { id: item.id });
            }
            previous = item.offset;
        }

        Ok(Self {
            version: header.version,
            next_slot: get_u16(bytes, NEXT_SLOT_OFFSET) % SLOT_COUNT,
            item_count,
            free_offset,
            free_size,
            items,
            data: bytes[DATA_OFFSET..DATA_OFFSET + DATA_CAPACITY].into(),
        })
    }

    /// Serializes the image into a slot-sized buffer.
    pub(crate) fn encode_into(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), SLOT_SIZE);
        out[..DATA_OFFSET].fill(0);
        put_u32(out, TAG_OFFSET, VENDOR_TAG);
        put_u32(out, VERSION_OFFSET, self.version);
        put_u16(out, NEXT_SLOT_OFFSET, self.next_slot);
        put_u16(out, ITEM_COUNT_OFFSET, self.item_count);
        put_u16(out, FREE_OFFSET_OFFSET, self.free_offset);
        put_u16(out, FREE_SIZE_OFFSET, self.free_size);
        for (i, item) in self.items().iter().enumerate() {
            let at = DIRECTORY_OFFSET + i * ITEM_ENTRY_SIZE;
            put_u16(out, at, item.id);
            put_u16(out, at + 2, item.offset);
            put_u16(out, at + 4, item.size);
            put_u16(out, at + 6, item.flags);
        }
        out[DATA_OFFSET..DATA_OFFSET + DATA_CAPACITY].copy_from_slice(&self.data);
        put_u32(out, VERSION2_OFFSET, self.version);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; SLOT_SIZE];
        self.encode_into(&mut out);
        out
    }

    pub fn header(&self) -> SlotHeader {
        SlotHeader {
            tag: VENDOR_TAG,
            version: self.version,
            version2: self.version,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn next_slot(&self) -> u16 {
        self.next_slot
    }

    pub fn item_count(&self) -> u16 {
        self.item_count
    }

    pub fn free_offset(&self) -> u16 {
        self.free_offset
    }

    pub fn free_size(&self) -> u16 {
        self.free_size
    }

    /// Live directory entries in insertion order.
    pub fn items(&self) -> &[ItemEntry] {
        &self.items[..self.item_count as usize]
    }

    pub fn find(&self, id: u16) -> Option<&ItemEntry> {
        self.items().iter().find(|item| item.id == id)
    }

    fn position(&self, id: u16) -> Option<usize> {
        self.items().iter().position(|item| item.id == id)
    }

    /// Payload bytes of `item`.
    pub fn payload(&self, item: &ItemEntry) -> &[u8] {
        let start = item.offset as usize;
        &self.data[start..start + item.size as usize]
    }

    /// Bytes reserved for the item at directory position `index`.
    ///
    /// Space is handed out in insertion order, so an item's reservation runs
    /// up to the next item's offset, or to the free cursor for the newest.
    fn allocation(&self, index: usize) -> u16 {
        let end = self
            .items()
            .get(index + 1)
            .map_or(self.free_offset, |next| next.offset);
        end - self.items[index].offset
    }

    /// Inserts or updates `id`, bumping the version.
    ///
    /// Every check runs before anything is modified, so a rejected call
    /// leaves the image exactly as it was.
    pub fn upsert(&mut self, id: u16, data: &[u8], policy: GrowPolicy) -> Result<Upsert, Error> {
        let size = u16::try_from(data.len())
            .map_err(|_| Error::invalid(format!("payload of {} bytes is too large", data.len())))?;
        let aligned = align_up(size)
            .ok_or_else(|| Error::invalid(format!("payload of {size} bytes cannot be aligned")))?;
        let version = self.version.checked_add(1).ok_or(Error::VersionExhausted)?;

        let outcome = match self.position(id) {
            Some(index) => {
                let item = self.items[index];
                if item.offset as usize + data.len() > DATA_CAPACITY {
                    return Err(Error::invalid(format!(
                        "item {id:#06x} of {size} bytes would run past the data region"
                    )));
                }
                let allocation = self.allocation(index);
                if aligned > allocation {
                    match policy {
                        GrowPolicy::Reject => {
                            return Err(Error::invalid(format!(
                                "item {id:#06x} was allocated {allocation} bytes, cannot grow to {size}"
                            )));
                        }
                        GrowPolicy::Overwrite => {
                            tracing::warn!(
                                id,
                                size,
                                allocation,
                                "item outgrows its allocation, overwriting following data"
                            );
                        }
                    }
                }
                self.write_payload(item.offset, data);
                self.items[index].size = size;
                Upsert::Updated
            }
            None => {
                if self.free_size < aligned {
                    return Err(Error::OutOfSpace {
                        id,
                        needed: aligned,
                        free: self.free_size,
                    });
                }
                if self.item_count as usize >= ITEM_MAX {
                    return Err(Error::DirectoryFull { max: ITEM_MAX });
                }
                let offset = self.free_offset;
                self.items[self.item_count as usize] = ItemEntry {
                    id,
                    offset,
                    size,
                    flags: 0,
                };
                self.item_count += 1;
                self.free_offset += aligned;
                self.free_size -= aligned;
                self.write_payload(offset, data);
                Upsert::Inserted
            }
        };

        self.version = version;
        Ok(outcome)
    }

    fn write_payload(&mut self, offset: u16, data: &[u8]) {
        let start = offset as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
    }

    /// Claims the slot for the next persist and points the image at the one
    /// after it. Returns the claimed slot.
    pub fn advance_slot(&mut self) -> u16 {
        let target = self.next_slot;
        self.next_slot = (target + 1) % SLOT_COUNT;
        target
    }

    /// Checks the allocator invariants.
    pub fn is_consistent(&self) -> bool {
        let items = self.items();
        self.free_offset as usize + self.free_size as usize == DATA_CAPACITY
            && self.free_offset % ALIGNMENT == 0
            && items.iter().all(|item| item.offset % ALIGNMENT == 0)
            && items.windows(2).all(|pair| pair[0].offset <= pair[1].offset)
    }
}

impl std::fmt::Debug for VendorImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorImage")
            .field("version", &self.version)
            .field("next_slot", &self.next_slot)
            .field("item_count", &self.item_count)
            .field("free_offset", &self.free_offset)
            .field("free_size", &self.free_size)
            .field("items", &self.items())
            .finish()
    }
}
