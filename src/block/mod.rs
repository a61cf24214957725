//! The composable block-image stack: leaves (`FileImage`, `MmapImage`,
//! `MemoryImage`) and decorators (`CowImage`, `ToggleImage`, `OverrideImage`,
//! `IoLogger`) that all implement [`BlockImage`].

pub mod cow;
pub mod file;
pub mod logger;
pub mod memory;
pub mod mmap;
pub mod override_image;
pub mod toggle;

use crate::error::{DiskError, DiskResult};

/// A fixed-block-size random-access store, addressed in whole blocks.
///
/// Implementors must reject out-of-range or misaligned requests with
/// [`DiskError::OutOfRange`] / [`DiskError::UnalignedWrite`] rather than
/// panicking; callers (the SCSI command handlers) turn those into sense data.
pub trait BlockImage: Send {
    /// Size of one block, in bytes.
    fn block_size(&self) -> u32;

    /// Capacity, in whole blocks.
    fn capacity_blocks(&self) -> u64;

    /// Reads `count` blocks starting at `lba` into a freshly allocated buffer.
    fn read(&mut self, lba: u64, count: u64) -> DiskResult<Vec<u8>>;

    /// Writes `data` (a whole number of blocks) starting at `lba`.
    fn write(&mut self, lba: u64, data: &[u8]) -> DiskResult<()>;

    /// Flushes and releases any resources held open (mmaps, sidecar files,
    /// inner images). Called once, on function teardown. The default is a
    /// no-op for leaves with nothing to flush.
    fn cleanup(&mut self) -> DiskResult<()> {
        Ok(())
    }

    fn capacity_bytes(&self) -> u64 {
        self.capacity_blocks() * self.block_size() as u64
    }

    /// Validates a block range against capacity; shared by every leaf/decorator.
    fn check_range(&self, lba: u64, count: u64) -> DiskResult<()> {
        let capacity = self.capacity_blocks();
        if count == 0 {
            return Ok(());
        }
        match lba.checked_add(count) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(DiskError::OutOfRange {
                offset: lba,
                count,
                capacity,
            }),
        }
    }

    /// Validates that `len` is a whole number of blocks.
    fn check_aligned(&self, len: usize) -> DiskResult<()> {
        let block_size = self.block_size() as usize;
        if len % block_size != 0 {
            return Err(DiskError::UnalignedWrite {
                len,
                block_size: self.block_size(),
            });
        }
        Ok(())
    }
}
