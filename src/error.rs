//! Error types for the block-image stack, the BBB framer and the Mass-Storage function.

use thiserror::Error;

use crate::scsi::sense::SenseKey;

/// Errors raised by [`crate::block::BlockImage`] backends.
#[derive(Debug, Error)]
pub enum DiskError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file size {size} is not a multiple of the block size {block_size}")]
    NotBlockAligned { size: u64, block_size: u32 },

    #[error("block range [{offset}, {offset}+{count}) is out of capacity ({capacity} blocks)")]
    OutOfRange {
        offset: u64,
        count: u64,
        capacity: u64,
    },

    #[error("write payload of {len} bytes is not a whole-block multiple (block size {block_size})")]
    UnalignedWrite { len: usize, block_size: u32 },
}

pub type DiskResult<T> = Result<T, DiskError>;

/// Errors raised while framing the Bulk-Only Transport.
#[derive(Debug, Error)]
pub enum BbbError {
    #[error("CBW signature mismatch")]
    InvalidSignature,

    #[error("CBW is too short: got {0} bytes, need 31")]
    ShortCbw(usize),

    #[error("CBW CB length {0} is out of the valid [1, 16] range")]
    InvalidCbLength(u8),

    #[error("data arrived with no command block wrapper in flight")]
    UnexpectedData,
}

/// A SCSI command-level failure. Carries the sense triple that `REQUEST_SENSE`
/// will report on the next call, plus a human-readable reason for logs.
#[derive(Debug, Error)]
#[error("scsi command failed: {message} (sense {sense_key:?}/{sense_code:#04x}/{sense_qualifier:#04x})")]
pub struct MassStorageError {
    pub sense_key: SenseKey,
    pub sense_code: u8,
    pub sense_qualifier: u8,
    pub message: String,
}

impl MassStorageError {
    pub fn new(
        sense_key: SenseKey,
        sense_code: u8,
        sense_qualifier: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sense_key,
            sense_code,
            sense_qualifier,
            message: message.into(),
        }
    }
}

/// Fatal errors during lifecycle management (setup, bind, enable twice, etc).
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error(transparent)]
    Disk(#[from] DiskError),

    #[error(transparent)]
    Bbb(#[from] BbbError),

    #[error("endpoint i/o error: {0}")]
    Endpoint(#[from] std::io::Error),

    #[error("function was already enabled; DISABLE must precede a second ENABLE")]
    AlreadyEnabled,

    #[error("function is not enabled")]
    NotEnabled,
}
