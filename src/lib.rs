//! A user-space USB Mass Storage Class gadget: Bulk-Only Transport framing
//! over the SCSI Transparent Command Set, backed by a composable block-image
//! stack (plain file, mmap, memory, copy-on-write, toggle, override,
//! logging) built for storage security research — reproducing TOCTOU races,
//! denying or silently dropping writes, and auditing every block touched.
//!
//! # Modules
//! * [`wire`] — CBW/CSW byte layouts and the residue/phase-error rules
//! * [`scsi`] — Command Block parsing and response records
//! * [`transport::bbb`] — the Bulk-Only framer state machine
//! * [`block`] — the `BlockImage` trait and its leaves/decorators
//! * [`endpoint`] — FunctionFS endpoint I/O and its in-memory test double
//! * [`descriptors`] — USB/FunctionFS descriptor and event plumbing
//! * [`function`] — lifecycle and SCSI command dispatch
//! * [`daemon`] — wires a function to a FunctionFS mount point

pub mod block;
pub mod config;
pub mod daemon;
pub mod descriptors;
pub mod endpoint;
pub mod error;
pub mod function;
pub mod scsi;
pub mod transport;
pub mod wire;

/// USB Mass Storage Class code.
pub const CLASS_MASS_STORAGE: u8 = 0x08;
