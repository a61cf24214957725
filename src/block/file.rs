//! A plain-file-backed block image, opened read-write on an existing file
//! or created and truncated to a requested capacity.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use super::BlockImage;
use crate::error::{DiskError, DiskResult};

pub struct FileImage {
    block_size: u32,
    capacity_blocks: u64,
    file: File,
}

impl FileImage {
    /// Opens an existing file whose size must already be a multiple of
    /// `block_size`.
    pub fn open(path: impl AsRef<Path>, block_size: u32) -> DiskResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if size % block_size as u64 != 0 {
            return Err(DiskError::NotBlockAligned { size, block_size });
        }
        Ok(FileImage {
            block_size,
            capacity_blocks: size / block_size as u64,
            file,
        })
    }

    /// Creates (or truncates) a file to `capacity_blocks * block_size` bytes.
    pub fn create(path: impl AsRef<Path>, block_size: u32, capacity_blocks: u64) -> DiskResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(capacity_blocks * block_size as u64)?;
        Ok(FileImage {
            block_size,
            capacity_blocks,
            file,
        })
    }
}

impl BlockImage for FileImage {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn capacity_blocks(&self) -> u64 {
        self.capacity_blocks
    }

    fn read(&mut self, lba: u64, count: u64) -> DiskResult<Vec<u8>> {
        self.check_range(lba, count)?;
        let len = count as usize * self.block_size as usize;
        let mut buf = vec![0u8; len];
        self.file.read_exact_at(&mut buf, lba * self.block_size as u64)?;
        Ok(buf)
    }

    fn write(&mut self, lba: u64, data: &[u8]) -> DiskResult<()> {
        self.check_aligned(data.len())?;
        let count = data.len() as u64 / self.block_size as u64;
        self.check_range(lba, count)?;
        self.file.write_all_at(data, lba * self.block_size as u64)?;
        Ok(())
    }

    fn cleanup(&mut self) -> DiskResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
