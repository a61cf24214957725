//! Wraps a [`BlockImage`] and records every read/write, both as a structured
//! binary trail (for offline analysis) and as `log` trace events (for
//! following a session live).

use std::io::Write;

use super::BlockImage;
use crate::error::DiskResult;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IoOp {
    Read = 0,
    Write = 1,
}

pub const FLAG_INCLUDES_DATA: u32 = 1 << 0;

/// One variable-width binary record: op(1) | offset_blk(8 LE) | count_blk(4 LE),
/// followed by `count_blk * block_size` raw data bytes when the header's
/// `INCLUDES_DATA` flag is set.
pub struct LogEntry {
    pub op: IoOp,
    pub offset_blk: u64,
    pub count_blk: u32,
}

pub const LOG_ENTRY_LEN: usize = 1 + 8 + 4;

impl LogEntry {
    pub fn to_bytes(&self) -> [u8; LOG_ENTRY_LEN] {
        let mut out = [0u8; LOG_ENTRY_LEN];
        out[0] = self.op as u8;
        out[1..9].copy_from_slice(&self.offset_blk.to_le_bytes());
        out[9..13].copy_from_slice(&self.count_blk.to_le_bytes());
        out
    }
}

/// Header written once at the start of a log file: block_size(4 LE) |
/// capacity(8 LE) | flags(4 LE), flags bit 0 = INCLUDES_DATA.
pub struct LogHeader {
    pub block_size: u32,
    pub capacity: u64,
    pub flags: u32,
}

pub const LOG_HEADER_LEN: usize = 4 + 8 + 4;

impl LogHeader {
    pub fn to_bytes(&self) -> [u8; LOG_HEADER_LEN] {
        let mut out = [0u8; LOG_HEADER_LEN];
        out[0..4].copy_from_slice(&self.block_size.to_le_bytes());
        out[4..12].copy_from_slice(&self.capacity.to_le_bytes());
        out[12..16].copy_from_slice(&self.flags.to_le_bytes());
        out
    }
}

pub struct IoLogger {
    base: Box<dyn BlockImage>,
    sink: Option<Box<dyn Write + Send>>,
    include_data: bool,
}

impl IoLogger {
    pub fn new(base: Box<dyn BlockImage>) -> Self {
        IoLogger {
            base,
            sink: None,
            include_data: false,
        }
    }

    /// Attaches a binary audit sink. The header is written immediately.
    /// When `include_data` is set, every logged entry carries the raw
    /// bytes that were read or written, not just the offset/count.
    pub fn with_sink(
        base: Box<dyn BlockImage>,
        mut sink: Box<dyn Write + Send>,
        include_data: bool,
    ) -> DiskResult<Self> {
        let flags = if include_data { FLAG_INCLUDES_DATA } else { 0 };
        sink.write_all(
            &LogHeader {
                block_size: base.block_size(),
                capacity: base.capacity_blocks(),
                flags,
            }
            .to_bytes(),
        )?;
        Ok(IoLogger {
            base,
            sink: Some(sink),
            include_data,
        })
    }

    fn record(&mut self, op: IoOp, offset_blk: u64, count_blk: u32, data: &[u8]) {
        log::trace!(
            "io {op:?} offset={offset_blk} count={count_blk}",
            op = op,
            offset_blk = offset_blk,
            count_blk = count_blk
        );

        if let Some(sink) = &mut self.sink {
            let entry = LogEntry {
                op,
                offset_blk,
                count_blk,
            };
            if let Err(err) = sink.write_all(&entry.to_bytes()) {
                log::warn!("failed to write i/o log entry: {err}");
                return;
            }
            if self.include_data {
                if let Err(err) = sink.write_all(data) {
                    log::warn!("failed to write i/o log data: {err}");
                }
            }
        }
    }
}

impl BlockImage for IoLogger {
    fn block_size(&self) -> u32 {
        self.base.block_size()
    }

    fn capacity_blocks(&self) -> u64 {
        self.base.capacity_blocks()
    }

    fn read(&mut self, lba: u64, count: u64) -> DiskResult<Vec<u8>> {
        let result = self.base.read(lba, count);
        if let Ok(data) = &result {
            self.record(IoOp::Read, lba, count as u32, data);
        }
        result
    }

    fn write(&mut self, lba: u64, data: &[u8]) -> DiskResult<()> {
        let count = data.len() as u64 / self.block_size().max(1) as u64;
        let result = self.base.write(lba, data);
        if result.is_ok() {
            self.record(IoOp::Write, lba, count as u32, data);
        }
        result
    }

    fn cleanup(&mut self) -> DiskResult<()> {
        self.base.cleanup()
    }
}
