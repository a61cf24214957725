//! Swaps between two backing images on command, without the USB host being
//! told anything changed. This is the TOCTOU primitive the emulator exists
//! to exercise: a READ(10) and a WRITE(10) to the same LBA can be served by
//! two different images if a toggle happens in between.

use super::BlockImage;
use crate::error::{DiskError, DiskResult};

pub struct ToggleImage {
    images: [Box<dyn BlockImage>; 2],
    active: usize,
}

impl ToggleImage {
    pub fn new(a: Box<dyn BlockImage>, b: Box<dyn BlockImage>) -> DiskResult<Self> {
        if a.block_size() != b.block_size() || a.capacity_blocks() != b.capacity_blocks() {
            return Err(DiskError::NotBlockAligned {
                size: b.capacity_bytes(),
                block_size: a.block_size(),
            });
        }
        Ok(ToggleImage {
            images: [a, b],
            active: 0,
        })
    }

    /// Switches the active image. Takes effect on the very next `read`/`write`.
    pub fn toggle(&mut self) {
        self.active = 1 - self.active;
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    fn active_image(&mut self) -> &mut Box<dyn BlockImage> {
        &mut self.images[self.active]
    }
}

impl BlockImage for ToggleImage {
    fn block_size(&self) -> u32 {
        self.images[self.active].block_size()
    }

    fn capacity_blocks(&self) -> u64 {
        self.images[self.active].capacity_blocks()
    }

    fn read(&mut self, lba: u64, count: u64) -> DiskResult<Vec<u8>> {
        self.active_image().read(lba, count)
    }

    fn write(&mut self, lba: u64, data: &[u8]) -> DiskResult<()> {
        self.active_image().write(lba, data)
    }

    fn cleanup(&mut self) -> DiskResult<()> {
        self.images[0].cleanup()?;
        self.images[1].cleanup()
    }
}
