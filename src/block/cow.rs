//! Copy-on-write overlay: reads come from whichever of (overlay, base) holds
//! the current data for a block; writes always land on the overlay and mark
//! the block dirty. The dirty bitset is persisted to a sidecar file next to
//! the overlay so the overlay can be reopened across runs.

use std::fs;
use std::path::{Path, PathBuf};

use bitvec::prelude::{BitVec, Lsb0};

use super::mmap::MmapImage;
use super::BlockImage;
use crate::error::DiskResult;

pub struct CowImage {
    base: Box<dyn BlockImage>,
    overlay: MmapImage,
    dirty: BitVec<u8, Lsb0>,
    metadata_path: PathBuf,
}

impl CowImage {
    /// Opens `overlay_path` (creating it at `base`'s capacity if absent) as
    /// the writable layer over `base`. The dirty bitset lives at
    /// `overlay_path` + `.metadata`.
    pub fn open(base: Box<dyn BlockImage>, overlay_path: impl AsRef<Path>) -> DiskResult<Self> {
        let block_size = base.block_size();
        let capacity_blocks = base.capacity_blocks();
        let overlay_path = overlay_path.as_ref();

        let overlay = if overlay_path.exists() {
            MmapImage::open(overlay_path, block_size)?
        } else {
            MmapImage::create(overlay_path, block_size, capacity_blocks)?
        };

        let metadata_path = PathBuf::from(format!("{}.metadata", overlay_path.display()));
        let dirty = load_or_init_bitset(&metadata_path, capacity_blocks as usize)?;

        Ok(CowImage {
            base,
            overlay,
            dirty,
            metadata_path,
        })
    }

    /// Persists the dirty bitset to the sidecar file.
    pub fn flush_metadata(&self) -> DiskResult<()> {
        fs::write(&self.metadata_path, self.dirty.as_raw_slice())?;
        Ok(())
    }

    fn is_dirty(&self, block: u64) -> bool {
        self.dirty[block as usize]
    }

    /// Length of the run starting at `start` that shares `start`'s dirty
    /// state, capped at `limit`. Avoids a syscall per block on long runs.
    fn run_len(&self, start: u64, limit: u64) -> u64 {
        let want = self.is_dirty(start);
        let mut end = start + 1;
        while end < limit && self.is_dirty(end) == want {
            end += 1;
        }
        end - start
    }
}

fn load_or_init_bitset(path: &Path, capacity_blocks: usize) -> DiskResult<BitVec<u8, Lsb0>> {
    if path.exists() {
        let bytes = fs::read(path)?;
        let mut bits = BitVec::<u8, Lsb0>::from_vec(bytes);
        bits.resize(capacity_blocks, false);
        Ok(bits)
    } else {
        Ok(BitVec::<u8, Lsb0>::repeat(false, capacity_blocks))
    }
}

impl BlockImage for CowImage {
    fn block_size(&self) -> u32 {
        self.overlay.block_size()
    }

    fn capacity_blocks(&self) -> u64 {
        self.overlay.capacity_blocks()
    }

    fn read(&mut self, lba: u64, count: u64) -> DiskResult<Vec<u8>> {
        self.check_range(lba, count)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let end = lba + count;
        if (lba..end).all(|b| !self.is_dirty(b)) {
            return self.base.read(lba, count);
        }
        if (lba..end).all(|b| self.is_dirty(b)) {
            return self.overlay.read(lba, count);
        }

        let mut out = Vec::with_capacity((count * self.block_size() as u64) as usize);
        let mut cur = lba;
        while cur < end {
            let run = self.run_len(cur, end);
            let chunk = if self.is_dirty(cur) {
                self.overlay.read(cur, run)?
            } else {
                self.base.read(cur, run)?
            };
            out.extend_from_slice(&chunk);
            cur += run;
        }
        Ok(out)
    }

    fn write(&mut self, lba: u64, data: &[u8]) -> DiskResult<()> {
        self.check_aligned(data.len())?;
        let count = data.len() as u64 / self.block_size() as u64;
        self.check_range(lba, count)?;
        self.overlay.write(lba, data)?;
        for block in lba..lba + count {
            self.dirty.set(block as usize, true);
        }
        Ok(())
    }

    fn cleanup(&mut self) -> DiskResult<()> {
        self.flush_metadata()?;
        self.overlay.cleanup()?;
        self.base.cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::memory::MemoryImage;
    use tempfile_shim::TempPath;

    mod tempfile_shim {
        use std::path::PathBuf;

        /// Minimal scratch-file helper; avoids pulling in a dev-dependency
        /// just for a handful of unit tests.
        pub struct TempPath(pub PathBuf);

        impl TempPath {
            pub fn new(name: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("evilstor-cow-test-{}-{}", std::process::id(), name));
                TempPath(path)
            }
        }

        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
                let mut meta = self.0.clone().into_os_string();
                meta.push(".metadata");
                let _ = std::fs::remove_file(meta);
            }
        }
    }

    #[test]
    fn clean_read_passes_through_to_base() {
        let mut base = MemoryImage::new(512, 4).unwrap();
        base.write(0, &vec![0x11; 512 * 4]).unwrap();

        let overlay_path = TempPath::new("clean");
        let mut cow = CowImage::open(Box::new(base), &overlay_path.0).unwrap();

        assert_eq!(cow.read(0, 4).unwrap(), vec![0x11; 512 * 4]);
    }

    #[test]
    fn write_marks_dirty_and_shadows_base() {
        let base = MemoryImage::new(512, 4).unwrap();
        let overlay_path = TempPath::new("dirty");
        let mut cow = CowImage::open(Box::new(base), &overlay_path.0).unwrap();

        cow.write(1, &vec![0xAB; 512]).unwrap();
        let data = cow.read(0, 2).unwrap();
        assert!(data[..512].iter().all(|&b| b == 0));
        assert!(data[512..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn mixed_run_read_stitches_base_and_overlay() {
        let mut base = MemoryImage::new(512, 4).unwrap();
        base.write(0, &vec![0x22; 512 * 4]).unwrap();
        let overlay_path = TempPath::new("mixed");
        let mut cow = CowImage::open(Box::new(base), &overlay_path.0).unwrap();

        cow.write(2, &vec![0x33; 512]).unwrap();
        let data = cow.read(0, 4).unwrap();
        assert_eq!(&data[0..512], &vec![0x22; 512][..]);
        assert_eq!(&data[512..1024], &vec![0x22; 512][..]);
        assert_eq!(&data[1024..1536], &vec![0x33; 512][..]);
        assert_eq!(&data[1536..2048], &vec![0x22; 512][..]);
    }
}
