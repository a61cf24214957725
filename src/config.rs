//! Function-level configuration: write permissions and the FunctionFS mount
//! point the emulator binds to.

use std::path::PathBuf;

/// What happens when the host issues a WRITE(10).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum WritePerms {
    /// Writes reach the backing image.
    #[default]
    Allow,
    /// Writes are rejected with `DATA_PROTECT` sense; the host sees a
    /// failed command.
    Deny,
    /// Writes report success to the host but never reach the backing
    /// image — data silently vanishes.
    Drop,
}

#[derive(Debug, Clone)]
pub struct MassStorageConfig {
    /// Directory the FunctionFS instance is mounted at (contains `ep0`,
    /// `ep1`, `ep2`, ...).
    pub mount_point: PathBuf,
    pub block_size: u32,
    pub write_perms: WritePerms,
    /// Vendor/product/version strings reported by INQUIRY, space-padded to
    /// 8/16/4 bytes.
    pub vendor_id: String,
    pub product_id: String,
    pub product_version: String,
    /// `wMaxPacketSize` advertised for the high-speed bulk endpoints.
    /// Full-speed bulk endpoints stay fixed at 64 bytes, the USB 2.0 ceiling
    /// for that transfer type at that speed.
    pub hs_packet_size: u16,
}

impl MassStorageConfig {
    pub fn new(mount_point: impl Into<PathBuf>, block_size: u32) -> Self {
        MassStorageConfig {
            mount_point: mount_point.into(),
            block_size,
            write_perms: WritePerms::default(),
            vendor_id: "evilstr".to_string(),
            product_id: "usb mass storage".to_string(),
            product_version: "0.1".to_string(),
            hs_packet_size: 0x200,
        }
    }
}
