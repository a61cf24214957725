//! FunctionFS descriptor blob construction: the interface + bulk endpoint
//! pair advertised as Mass Storage / SCSI Transparent / Bulk-Only, and the
//! `ep0` descriptor/strings blobs FunctionFS expects to be written once at
//! startup.

pub const USB_CLASS_MASS_STORAGE: u8 = 0x08;
pub const USB_SUBCLASS_SCSI_TRANSPARENT: u8 = 0x06;
pub const USB_PROTOCOL_BULK_ONLY_TRANSPORT: u8 = 0x50;

const DESC_TYPE_INTERFACE: u8 = 0x04;
const DESC_TYPE_ENDPOINT: u8 = 0x05;
const ENDPOINT_ATTR_BULK: u8 = 0x02;

const FULL_SPEED_MAX_PACKET: u16 = 64;

const FUNCTIONFS_DESCRIPTORS_MAGIC_V2: u32 = 0x0000_0002;
const FUNCTIONFS_STRINGS_MAGIC: u32 = 0x0000_0002;

const FUNCTIONFS_HAS_FS_DESC: u32 = 0x0000_0001;
const FUNCTIONFS_HAS_HS_DESC: u32 = 0x0000_0002;

/// Endpoint addresses as seen by the host: `epIN` / `epOUT` under the mount
/// point correspond to these logical addresses inside the descriptor blob
/// (FunctionFS renumbers them at bind time; `0x81`/`0x01` are placeholders
/// the kernel accepts for "first bulk IN/OUT endpoint").
pub const ENDPOINT_ADDRESS_IN: u8 = 0x81;
pub const ENDPOINT_ADDRESS_OUT: u8 = 0x01;

fn interface_descriptor() -> [u8; 9] {
    [
        9, // bLength
        DESC_TYPE_INTERFACE,
        0, // bInterfaceNumber, patched by FunctionFS
        0, // bAlternateSetting
        2, // bNumEndpoints
        USB_CLASS_MASS_STORAGE,
        USB_SUBCLASS_SCSI_TRANSPARENT,
        USB_PROTOCOL_BULK_ONLY_TRANSPORT,
        0, // iInterface
    ]
}

fn endpoint_descriptor(address: u8, max_packet_size: u16) -> [u8; 7] {
    let mps = max_packet_size.to_le_bytes();
    [
        7, // bLength
        DESC_TYPE_ENDPOINT,
        address,
        ENDPOINT_ATTR_BULK,
        mps[0],
        mps[1],
        0, // bInterval, ignored for bulk
    ]
}

fn descriptor_set(in_mps: u16, out_mps: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(9 + 7 + 7);
    out.extend_from_slice(&interface_descriptor());
    out.extend_from_slice(&endpoint_descriptor(ENDPOINT_ADDRESS_IN, in_mps));
    out.extend_from_slice(&endpoint_descriptor(ENDPOINT_ADDRESS_OUT, out_mps));
    out
}

/// Builds the FunctionFS v2 descriptor blob written to `ep0` once at
/// startup: full-speed and high-speed variants of the same interface,
/// differing only in `wMaxPacketSize`. `hs_packet_size` comes from
/// [`crate::config::MassStorageConfig`].
pub fn build_descriptors_v2(hs_packet_size: u16) -> Vec<u8> {
    let fs_set = descriptor_set(FULL_SPEED_MAX_PACKET, FULL_SPEED_MAX_PACKET);
    let hs_set = descriptor_set(hs_packet_size, hs_packet_size);

    let flags = FUNCTIONFS_HAS_FS_DESC | FUNCTIONFS_HAS_HS_DESC;
    let header_len = 4 + 4 + 4; // magic, length, flags
    let body_len = 4 + fs_set.len() + 4 + hs_set.len();
    let total_len = (header_len + body_len) as u32;

    let mut out = Vec::with_capacity(total_len as usize);
    out.extend_from_slice(&FUNCTIONFS_DESCRIPTORS_MAGIC_V2.to_le_bytes());
    out.extend_from_slice(&total_len.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());

    out.extend_from_slice(&1u32.to_le_bytes()); // fs descriptor count
    out.extend_from_slice(&fs_set);

    out.extend_from_slice(&1u32.to_le_bytes()); // hs descriptor count
    out.extend_from_slice(&hs_set);

    out
}

/// Builds the FunctionFS strings blob: one language (US English), one
/// interface string.
pub fn build_strings(interface_name: &str) -> Vec<u8> {
    const LANG_US_ENGLISH: u16 = 0x0409;

    let mut name_bytes = interface_name.as_bytes().to_vec();
    name_bytes.push(0); // NUL-terminated, per FunctionFS string table convention

    let str_count = 1u32;
    let lang_count = 1u32;
    let body_len = 2 + name_bytes.len(); // lang code + string
    let header_len = 4 + 4 + 4;
    let total_len = (header_len + body_len) as u32;

    let mut out = Vec::with_capacity(total_len as usize);
    out.extend_from_slice(&FUNCTIONFS_STRINGS_MAGIC.to_le_bytes());
    out.extend_from_slice(&total_len.to_le_bytes());
    out.extend_from_slice(&str_count.to_le_bytes());
    out.extend_from_slice(&LANG_US_ENGLISH.to_le_bytes());
    let _ = lang_count;
    out.extend_from_slice(&name_bytes);
    out
}

/// FunctionFS control-endpoint event types, read from `ep0` as
/// `struct usb_functionfs_event` records.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FfsEventType {
    Bind = 0,
    Unbind = 1,
    Enable = 2,
    Disable = 3,
    Setup = 4,
    Suspend = 5,
    Resume = 6,
}

impl FfsEventType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Bind),
            1 => Some(Self::Unbind),
            2 => Some(Self::Enable),
            3 => Some(Self::Disable),
            4 => Some(Self::Setup),
            5 => Some(Self::Suspend),
            6 => Some(Self::Resume),
            _ => None,
        }
    }
}

/// A parsed `struct usb_ctrlrequest` (8 bytes), present on `Setup` events.
#[derive(Debug, Copy, Clone)]
pub struct CtrlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl CtrlRequest {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 {
            return None;
        }
        Some(CtrlRequest {
            request_type: bytes[0],
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }

    pub fn is_device_to_host(&self) -> bool {
        self.request_type & 0x80 != 0
    }

    /// Recipient (bits 0..4) is INTERFACE and type (bits 5..6) is CLASS, the
    /// scope the bulk-only class requests (GET_MAX_LUN, RESET) are defined
    /// against. Any other recipient/type, even with a matching `bRequest`,
    /// belongs to the generic/standard control path.
    pub fn is_class_interface_request(&self) -> bool {
        let recipient = self.request_type & 0x1f;
        let req_type = (self.request_type >> 5) & 0x3;
        recipient == 0x01 && req_type == 0x01
    }
}
