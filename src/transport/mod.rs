//! Bulk-Only Transport framing, layered over an [`EndpointChannel`](crate::endpoint::EndpointChannel).

pub mod bbb;

/// `bRequest` value for `GET_MAX_LUN`, the one class-specific control request
/// this emulator answers (always with a single LUN, value 0).
pub const CLASS_SPECIFIC_GET_MAX_LUN: u8 = 0xfe;

/// `bRequest` value for the Bulk-Only Mass Storage Reset control request.
pub const CLASS_SPECIFIC_BULK_ONLY_MASS_STORAGE_RESET: u8 = 0xff;
