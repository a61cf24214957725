//! A memory-mapped file block image. Reads and writes go straight through
//! the mapping; there is no write-back buffering to reason about.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;

use super::BlockImage;
use crate::error::{DiskError, DiskResult};

pub struct MmapImage {
    block_size: u32,
    capacity_blocks: u64,
    map: MmapMut,
    _file: File,
}

impl MmapImage {
    pub fn open(path: impl AsRef<Path>, block_size: u32) -> DiskResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if size % block_size as u64 != 0 {
            return Err(DiskError::NotBlockAligned { size, block_size });
        }
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(MmapImage {
            block_size,
            capacity_blocks: size / block_size as u64,
            map,
            _file: file,
        })
    }

    pub fn create(path: impl AsRef<Path>, block_size: u32, capacity_blocks: u64) -> DiskResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(capacity_blocks * block_size as u64)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(MmapImage {
            block_size,
            capacity_blocks,
            map,
            _file: file,
        })
    }

    pub fn flush(&self) -> DiskResult<()> {
        self.map.flush().map_err(DiskError::Io)
    }
}

impl BlockImage for MmapImage {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn capacity_blocks(&self) -> u64 {
        self.capacity_blocks
    }

    fn read(&mut self, lba: u64, count: u64) -> DiskResult<Vec<u8>> {
        self.check_range(lba, count)?;
        let start = lba as usize * self.block_size as usize;
        let len = count as usize * self.block_size as usize;
        Ok(self.map[start..start + len].to_vec())
    }

    fn write(&mut self, lba: u64, data: &[u8]) -> DiskResult<()> {
        self.check_aligned(data.len())?;
        let count = data.len() as u64 / self.block_size as u64;
        self.check_range(lba, count)?;
        let start = lba as usize * self.block_size as usize;
        self.map[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn cleanup(&mut self) -> DiskResult<()> {
        self.flush()
    }
}
