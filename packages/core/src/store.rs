//! The vendor store: recovery, lookups and rotating persistence.

use std::cmp::Reverse;

use bytes::Bytes;
use vendor_storage_block::{BlockTransport, Partition, BLOCK_SIZE};

use crate::image::{ItemEntry, Upsert, VendorImage};
use crate::layout::{required_blocks, slot_lba, SlotHeader, SLOT_BLOCKS, SLOT_COUNT, SLOT_SIZE};
use crate::{Error, StoreConfig};

/// Snapshot of the store's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub version: u32,
    /// Slot the next write will go to.
    pub next_slot: u16,
    /// Slot the image was recovered from or last persisted to. `None` for a
    /// fresh image that has never been written.
    pub active_slot: Option<u16>,
    pub item_count: u16,
    pub free_offset: u16,
    pub free_size: u16,
    /// Set after a failed persist: memory is ahead of the media until the
    /// next successful write or a reload.
    pub diverged: bool,
}

/// A redundant, versioned key-value store on a raw partition.
///
/// The partition holds [`SLOT_COUNT`] copies of the store. Every write
/// persists the whole image to the next slot in turn, so a power cut can
/// only damage the slot being written; recovery then falls back to the
/// newest intact copy.
///
/// Reads are served from memory. Writes take `&mut self`; wrap the store in
/// a [`SharedVendorStore`](crate::SharedVendorStore) to share it.
pub struct VendorStore<T> {
    partition: Partition<T>,
    config: StoreConfig,
    image: VendorImage,
    active_slot: Option<u16>,
    diverged: bool,
    scratch: Vec<u8>,
}

impl<T: BlockTransport> VendorStore<T> {
    /// Resolves the configured partition and recovers the newest valid slot.
    ///
    /// With no valid slot on media the store starts from an empty image that
    /// is not written until the first [`VendorStore::write`].
    pub fn initialize(transport: T, config: StoreConfig) -> Result<Self, Error> {
        config.validate()?;
        let mut partition = Partition::open(transport, &config.partition)?;

        let extent = partition.extent();
        if extent.blocks < required_blocks() {
            return Err(Error::PartitionTooSmall {
                name: config.partition.clone(),
                blocks: extent.blocks,
                required: required_blocks(),
            });
        }

        let mut scratch = vec![0u8; SLOT_SIZE];
        let (image, active_slot) = recover(&mut partition, &mut scratch)?;
        Ok(Self {
            partition,
            config,
            image,
            active_slot,
            diverged: false,
            scratch,
        })
    }

    /// Discards the in-memory image and recovers again from media.
    pub fn reload(&mut self) -> Result<(), Error> {
        let (image, active_slot) = recover(&mut self.partition, &mut self.scratch)?;
        self.image = image;
        self.active_slot = active_slot;
        self.diverged = false;
        Ok(())
    }

    /// Copies up to `buf.len()` bytes of item `id` into `buf` and returns
    /// the number of bytes copied.
    pub fn read(&self, id: u16, buf: &mut [u8]) -> Result<usize, Error> {
        let item = self.image.find(id).ok_or(Error::NotFound { id })?;
        let payload = self.image.payload(item);
        let len = buf.len().min(payload.len());
        buf[..len].copy_from_slice(&payload[..len]);
        Ok(len)
    }

    /// Returns a copy of the whole payload of item `id`.
    pub fn get(&self, id: u16) -> Result<Bytes, Error> {
        let item = self.image.find(id).ok_or(Error::NotFound { id })?;
        Ok(Bytes::copy_from_slice(self.image.payload(item)))
    }

    pub fn contains(&self, id: u16) -> bool {
        self.image.find(id).is_some()
    }

    /// Directory entries in insertion order.
    pub fn items(&self) -> &[ItemEntry] {
        self.image.items()
    }

    /// Inserts or replaces item `id` and persists the image.
    ///
    /// Validation failures leave the store untouched. If persisting fails
    /// the in-memory change is kept and [`StoreStatus::diverged`] is set;
    /// call [`VendorStore::reload`] before relying on the store again.
    pub fn write(&mut self, id: u16, data: &[u8]) -> Result<(), Error> {
        let outcome = self.image.upsert(id, data, self.config.grow_policy)?;
        tracing::debug!(
            id,
            size = data.len(),
            inserted = outcome == Upsert::Inserted,
            version = self.image.version(),
            "updated vendor item"
        );
        self.persist()
    }

    fn persist(&mut self) -> Result<(), Error> {
        let slot = self.image.advance_slot();
        self.image.encode_into(&mut self.scratch);
        match self
            .partition
            .write(slot_lba(slot), SLOT_BLOCKS, &self.scratch)
        {
            Ok(()) => {
                tracing::debug!(slot, version = self.image.version(), "persisted vendor slot");
                self.active_slot = Some(slot);
                self.diverged = false;
                Ok(())
            }
            Err(source) => {
                tracing::warn!(
                    slot,
                    version = self.image.version(),
                    error = %source,
                    "failed to persist vendor slot"
                );
                self.diverged = true;
                Err(Error::slot_io(slot, source))
            }
        }
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            version: self.image.version(),
            next_slot: self.image.next_slot(),
            active_slot: self.active_slot,
            item_count: self.image.item_count(),
            free_offset: self.image.free_offset(),
            free_size: self.image.free_size(),
            diverged: self.diverged,
        }
    }

    pub fn image(&self) -> &VendorImage {
        &self.image
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn partition(&self) -> &Partition<T> {
        &self.partition
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.partition.transport_mut()
    }

    pub fn into_transport(self) -> T {
        self.partition.into_transport()
    }
}

impl<T> std::fmt::Debug for VendorStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorStore")
            .field("partition", &self.config.partition)
            .field("image", &self.image)
            .field("active_slot", &self.active_slot)
            .field("diverged", &self.diverged)
            .finish()
    }
}

/// Reads the first and last block of `slot`.
fn probe_slot<T: BlockTransport>(
    partition: &mut Partition<T>,
    slot: u16,
) -> Result<SlotHeader, Error> {
    let mut first = [0u8; BLOCK_SIZE];
    let mut last = [0u8; BLOCK_SIZE];
    let lba = slot_lba(slot);
    partition
        .read(lba, 1, &mut first)
        .map_err(|e| Error::slot_io(slot, e))?;
    partition
        .read(lba + u64::from(SLOT_BLOCKS) - 1, 1, &mut last)
        .map_err(|e| Error::slot_io(slot, e))?;
    Ok(SlotHeader::from_blocks(&first, &last))
}

/// Picks the image to start from.
///
/// Candidates are the valid slots ordered by version, newest first, with the
/// lower slot index winning a tie. A candidate whose body does not decode
/// is skipped in favor of the next one.
fn recover<T: BlockTransport>(
    partition: &mut Partition<T>,
    scratch: &mut [u8],
) -> Result<(VendorImage, Option<u16>), Error> {
    let mut candidates = Vec::with_capacity(SLOT_COUNT as usize);
    for slot in 0..SLOT_COUNT {
        let header = probe_slot(partition, slot)?;
        tracing::debug!(
            slot,
            tag = header.tag,
            version = header.version,
            version2 = header.version2,
            valid = header.is_valid(),
            "probed vendor slot"
        );
        if header.is_valid() {
            candidates.push((slot, header.version));
        }
    }
    candidates.sort_by_key(|&(slot, version)| (Reverse(version), slot));

    if let [(first, version), (second, other), ..] = candidates[..] {
        if version == other {
            tracing::warn!(
                version,
                chosen = first,
                ignored = second,
                "vendor slots share the newest version"
            );
        }
    }

    for (slot, version) in candidates {
        partition
            .read(slot_lba(slot), SLOT_BLOCKS, scratch)
            .map_err(|e| Error::slot_io(slot, e))?;
        match VendorImage::decode(scratch) {
            Ok(image) => {
                tracing::info!(
                    slot,
                    version,
                    items = image.item_count(),
                    partition = partition.name(),
                    "recovered vendor storage"
                );
                return Ok((image, Some(slot)));
            }
            Err(error) => {
                tracing::warn!(slot, version, %error, "skipping unusable vendor slot");
            }
        }
    }

    tracing::info!(
        partition = partition.name(),
        "no valid vendor slot, starting empty"
    );
    Ok((VendorImage::fresh(), None))
}
