//! An in-memory block image; the leaf `MemoryDiskImage` analog.

use super::BlockImage;
use crate::error::{DiskError, DiskResult};

pub struct MemoryImage {
    block_size: u32,
    data: Vec<u8>,
}

impl MemoryImage {
    pub fn new(block_size: u32, capacity_blocks: u64) -> DiskResult<Self> {
        let total = capacity_blocks
            .checked_mul(block_size as u64)
            .ok_or(DiskError::NotBlockAligned {
                size: u64::MAX,
                block_size,
            })?;
        Ok(MemoryImage {
            block_size,
            data: vec![0u8; total as usize],
        })
    }
}

impl BlockImage for MemoryImage {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn capacity_blocks(&self) -> u64 {
        self.data.len() as u64 / self.block_size as u64
    }

    fn read(&mut self, lba: u64, count: u64) -> DiskResult<Vec<u8>> {
        self.check_range(lba, count)?;
        let start = lba as usize * self.block_size as usize;
        let len = count as usize * self.block_size as usize;
        Ok(self.data[start..start + len].to_vec())
    }

    fn write(&mut self, lba: u64, data: &[u8]) -> DiskResult<()> {
        self.check_aligned(data.len())?;
        let count = data.len() as u64 / self.block_size as u64;
        self.check_range(lba, count)?;
        let start = lba as usize * self.block_size as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut img = MemoryImage::new(512, 8).unwrap();
        let payload = vec![0xAB; 512 * 2];
        img.write(2, &payload).unwrap();
        assert_eq!(img.read(2, 2).unwrap(), payload);
    }

    #[test]
    fn read_out_of_range_is_rejected() {
        let mut img = MemoryImage::new(512, 8).unwrap();
        assert!(matches!(
            img.read(7, 2),
            Err(DiskError::OutOfRange { .. })
        ));
    }

    #[test]
    fn write_unaligned_payload_is_rejected() {
        let mut img = MemoryImage::new(512, 8).unwrap();
        assert!(matches!(
            img.write(0, &[0u8; 100]),
            Err(DiskError::UnalignedWrite { .. })
        ));
    }
}
