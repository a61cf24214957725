//! Per-block read/write interception, keyed by a single LBA or an inclusive
//! LBA range. Read overrides can fabricate a response instead of touching
//! the underlying image; write overrides are observe-only taps used for
//! logging/instrumentation, the actual write always reaches the base image.
//!
//! Unlike the source this is ported from, a read override whose range does
//! not cover part of the request is *skipped*, not treated as a reason to
//! stop scanning the rest of the list — so overrides earlier in the list
//! can't shadow ones registered after them for blocks they don't claim.

use super::BlockImage;
use crate::error::DiskResult;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OverrideKey {
    Block(u64),
    /// Inclusive on both ends, matching the block-index convention used
    /// everywhere else in this stack.
    Range(u64, u64),
}

impl OverrideKey {
    fn bounds(&self) -> (u64, u64) {
        match *self {
            OverrideKey::Block(b) => (b, b),
            OverrideKey::Range(lo, hi) => (lo, hi),
        }
    }

    /// Intersection with `[lba, lba + count)`, as a half-open range, if any.
    fn intersect(&self, lba: u64, count: u64) -> Option<(u64, u64)> {
        let (lo, hi) = self.bounds();
        let req_end = lba + count;
        let start = lo.max(lba);
        let end = (hi + 1).min(req_end);
        if start < end {
            Some((start, end))
        } else {
            None
        }
    }
}

/// `(inner, offset, n)` — the base image is passed through so a callback can
/// compose fabricated bytes with real backing data instead of only ever
/// replacing it outright.
pub type ReadCallback = Box<dyn FnMut(&mut dyn BlockImage, u64, u64) -> Option<Vec<u8>> + Send>;
pub type WriteCallback = Box<dyn FnMut(&mut dyn BlockImage, u64, &[u8]) + Send>;

pub struct ReadOverride {
    pub key: OverrideKey,
    pub callback: ReadCallback,
}

pub struct WriteOverride {
    pub key: OverrideKey,
    pub callback: WriteCallback,
}

pub struct OverrideImage {
    base: Box<dyn BlockImage>,
    read_overrides: Vec<ReadOverride>,
    write_overrides: Vec<WriteOverride>,
}

impl OverrideImage {
    pub fn new(base: Box<dyn BlockImage>) -> Self {
        OverrideImage {
            base,
            read_overrides: Vec::new(),
            write_overrides: Vec::new(),
        }
    }

    pub fn add_read_override(&mut self, key: OverrideKey, callback: ReadCallback) {
        self.read_overrides.push(ReadOverride { key, callback });
    }

    pub fn add_write_override(&mut self, key: OverrideKey, callback: WriteCallback) {
        self.write_overrides.push(WriteOverride { key, callback });
    }
}

impl BlockImage for OverrideImage {
    fn block_size(&self) -> u32 {
        self.base.block_size()
    }

    fn capacity_blocks(&self) -> u64 {
        self.base.capacity_blocks()
    }

    fn read(&mut self, lba: u64, count: u64) -> DiskResult<Vec<u8>> {
        self.check_range(lba, count)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let block_size = self.block_size() as usize;
        let Self {
            base, read_overrides, ..
        } = self;
        let mut out = base.read(lba, count)?;
        let mut resolved = vec![false; count as usize];

        for over in read_overrides.iter_mut() {
            let Some((start, end)) = over.key.intersect(lba, count) else {
                continue;
            };

            let mut cur = start;
            while cur < end {
                if resolved[(cur - lba) as usize] {
                    cur += 1;
                    continue;
                }
                let mut run_end = cur + 1;
                while run_end < end && !resolved[(run_end - lba) as usize] {
                    run_end += 1;
                }
                let run_len = run_end - cur;
                if let Some(data) = (over.callback)(base.as_mut(), cur, run_len) {
                    let offset = (cur - lba) as usize * block_size;
                    out[offset..offset + data.len().min(run_len as usize * block_size)]
                        .copy_from_slice(&data[..data.len().min(run_len as usize * block_size)]);
                    for b in cur..run_end {
                        resolved[(b - lba) as usize] = true;
                    }
                }
                cur = run_end;
            }
        }

        Ok(out)
    }

    fn write(&mut self, lba: u64, data: &[u8]) -> DiskResult<()> {
        self.check_aligned(data.len())?;
        let count = data.len() as u64 / self.block_size() as u64;
        self.check_range(lba, count)?;

        let Self {
            base,
            write_overrides,
            ..
        } = self;
        for over in write_overrides.iter_mut() {
            if over.key.intersect(lba, count).is_some() {
                (over.callback)(base.as_mut(), lba, data);
            }
        }

        base.write(lba, data)
    }

    fn cleanup(&mut self) -> DiskResult<()> {
        self.base.cleanup()
    }
}
