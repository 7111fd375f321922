//! Disk image files as block devices.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{check_buffer, BlockError, BlockTransport, PartitionExtent, PartitionTable, BLOCK_SIZE};

/// A block device backed by a regular file.
///
/// The file length must be a whole number of blocks. Every write is flushed
/// with `sync_data` before it is reported as complete.
#[derive(Debug)]
pub struct FileDisk {
    file: File,
    path: PathBuf,
    blocks: u64,
    table: PartitionTable,
}

impl FileDisk {
    /// Opens an existing image and parses `partitions` as its table.
    ///
    /// A missing or unreadable file, or one whose length is not a multiple
    /// of [`BLOCK_SIZE`], is reported as [`BlockError::DeviceUnavailable`].
    pub fn open(path: impl AsRef<Path>, partitions: &str) -> Result<Self, BlockError> {
        let path = path.as_ref();
        let unavailable = |reason: String| BlockError::DeviceUnavailable {
            device: path.display().to_string(),
            reason,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| unavailable(err.to_string()))?;
        let len = file
            .metadata()
            .map_err(|err| unavailable(err.to_string()))?
            .len();
        if len == 0 || len % BLOCK_SIZE as u64 != 0 {
            return Err(unavailable(format!(
                "length {len} is not a positive multiple of {BLOCK_SIZE}"
            )));
        }

        let blocks = len / BLOCK_SIZE as u64;
        let table = PartitionTable::parse(partitions, blocks)?;
        tracing::debug!(
            device = %path.display(),
            blocks,
            partitions = table.len(),
            "opened disk image"
        );
        Ok(Self {
            file,
            path: path.to_path_buf(),
            blocks,
            table,
        })
    }

    /// Creates a zero-filled image of `blocks` blocks and opens it.
    ///
    /// Fails if the file already exists. The partition table and size are
    /// checked first, and a file that cannot be opened afterwards is removed.
    pub fn create(
        path: impl AsRef<Path>,
        blocks: u64,
        partitions: &str,
    ) -> Result<Self, BlockError> {
        let path = path.as_ref();
        let len = blocks
            .checked_mul(BLOCK_SIZE as u64)
            .ok_or_else(|| BlockError::DeviceUnavailable {
                device: path.display().to_string(),
                reason: format!("{blocks} blocks exceed the largest possible image"),
            })?;
        PartitionTable::parse(partitions, blocks)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let sized = file.set_len(len).and_then(|()| file.sync_all());
        drop(file);
        let result = sized
            .map_err(BlockError::from)
            .and_then(|()| Self::open(path, partitions));
        if result.is_err() {
            let _ = std::fs::remove_file(path);
        }
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_count(&self) -> u64 {
        self.blocks
    }

    pub fn table(&self) -> &PartitionTable {
        &self.table
    }

    fn seek_to(&mut self, lba: u64, count: u32) -> Result<(), BlockError> {
        PartitionExtent::new(0, self.blocks).absolute(lba, count)?;
        self.file.seek(SeekFrom::Start(lba * BLOCK_SIZE as u64))?;
        Ok(())
    }
}

impl BlockTransport for FileDisk {
    fn resolve_partition(&mut self, name: &str) -> Result<PartitionExtent, BlockError> {
        self.table.resolve(name)
    }

    fn read_blocks(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BlockError> {
        check_buffer(count, out.len())?;
        self.seek_to(lba, count)?;
        self.file.read_exact(out)?;
        Ok(())
    }

    fn write_blocks(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BlockError> {
        check_buffer(count, data.len())?;
        self.seek_to(lba, count)?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        Ok(())
    }
}
