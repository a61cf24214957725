//! Fixed-layout SCSI response records.

use super::sense::SenseKey;

pub const INQUIRY_RESPONSE_LEN: usize = 36;
pub const REQUEST_SENSE_RESPONSE_LEN: usize = 18;
pub const READ_CAPACITY_10_RESPONSE_LEN: usize = 8;
pub const MODE_SENSE_6_RESPONSE_LEN: usize = 4;

/// Standard INQUIRY data (SPC-3 6.4.2), vendor/product/version fields are
/// space-padded to their fixed widths.
pub struct InquiryData {
    pub peripheral_qualifier: u8,
    pub peripheral_type: u8,
    pub removable: bool,
    pub version: u8,
    pub response_data_format: u8,
    pub vendor_id: [u8; 8],
    pub product_id: [u8; 16],
    pub product_version: [u8; 4],
}

impl InquiryData {
    pub fn to_bytes(&self) -> [u8; INQUIRY_RESPONSE_LEN] {
        let mut out = [0u8; INQUIRY_RESPONSE_LEN];
        out[0] = (self.peripheral_qualifier << 5) | (self.peripheral_type & 0x1f);
        out[1] = if self.removable { 0x80 } else { 0x00 };
        out[2] = self.version;
        out[3] = self.response_data_format & 0x0f;
        out[4] = (INQUIRY_RESPONSE_LEN - 5) as u8; // additional length
        // bytes 5..8 are all-zero capability flags (SCCS, ACC, TPGS, ... ADDR16)
        out[8..16].copy_from_slice(&self.vendor_id);
        out[16..32].copy_from_slice(&self.product_id);
        out[32..36].copy_from_slice(&self.product_version);
        out
    }
}

/// Left-justifies `s` into an `N`-byte, space-padded field (SPC-3 ASCII data conventions).
pub fn padded_ascii_field<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [b' '; N];
    let bytes = s.as_bytes();
    let len = bytes.len().min(N);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

/// REQUEST SENSE fixed-format sense data (SPC-3 4.5.3).
pub struct RequestSenseData {
    pub sense_key: SenseKey,
    pub additional_sense_code: u8,
    pub additional_sense_code_qualifier: u8,
}

impl RequestSenseData {
    pub fn to_bytes(&self) -> [u8; REQUEST_SENSE_RESPONSE_LEN] {
        let mut out = [0u8; REQUEST_SENSE_RESPONSE_LEN];
        out[0] = 0x70; // valid=0, current errors
        out[2] = u8::from(self.sense_key) & 0x0f;
        out[7] = (REQUEST_SENSE_RESPONSE_LEN - 8) as u8; // additional sense length
        out[12] = self.additional_sense_code;
        out[13] = self.additional_sense_code_qualifier;
        out
    }
}

/// READ CAPACITY (10) parameter data (SBC-3 5.14.2).
pub struct ReadCapacity10Data {
    pub last_logical_block_address: u32,
    pub block_length: u32,
}

impl ReadCapacity10Data {
    pub fn to_bytes(&self) -> [u8; READ_CAPACITY_10_RESPONSE_LEN] {
        let mut out = [0u8; READ_CAPACITY_10_RESPONSE_LEN];
        out[0..4].copy_from_slice(&self.last_logical_block_address.to_be_bytes());
        out[4..8].copy_from_slice(&self.block_length.to_be_bytes());
        out
    }
}

/// MODE SENSE (6) header, no mode pages attached (SPC-3 7.4.3).
pub struct ModeSense6Data {
    pub medium_type: u8,
    pub device_specific_param: u8,
}

impl ModeSense6Data {
    pub fn to_bytes(&self) -> [u8; MODE_SENSE_6_RESPONSE_LEN] {
        [
            (MODE_SENSE_6_RESPONSE_LEN - 1) as u8,
            self.medium_type,
            self.device_specific_param,
            0, // block descriptor length
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inquiry_layout_matches_spec_fields() {
        let data = InquiryData {
            peripheral_qualifier: 0,
            peripheral_type: 0,
            removable: true,
            version: 0x05,
            response_data_format: 0x02,
            vendor_id: *b"evilstr ",
            product_id: *b"usb mass storage",
            product_version: *b"0.1 ",
        };
        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 36);
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 0x80);
        assert_eq!(bytes[2], 0x05);
        assert_eq!(bytes[3], 0x02);
        assert_eq!(bytes[4], 31);
        assert_eq!(&bytes[8..16], b"evilstr ");
        assert_eq!(&bytes[16..32], b"usb mass storage");
        assert_eq!(&bytes[32..36], b"0.1 ");
    }

    #[test]
    fn request_sense_carries_sense_triple() {
        let data = RequestSenseData {
            sense_key: SenseKey::DataProtect,
            additional_sense_code: 0x20,
            additional_sense_code_qualifier: 0x02,
        };
        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 18);
        assert_eq!(bytes[0], 0x70);
        assert_eq!(bytes[2] & 0x0f, u8::from(SenseKey::DataProtect));
        assert_eq!(bytes[7], 10);
        assert_eq!(bytes[12], 0x20);
        assert_eq!(bytes[13], 0x02);
    }

    #[test]
    fn read_capacity_encodes_last_lba_and_block_length() {
        let data = ReadCapacity10Data {
            last_logical_block_address: 0x1000,
            block_length: 512,
        };
        let bytes = data.to_bytes();
        assert_eq!(u32::from_be_bytes(bytes[0..4].try_into().unwrap()), 0x1000);
        assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 512);
    }

    #[test]
    fn mode_sense_header_has_fixed_mode_data_length() {
        let data = ModeSense6Data {
            medium_type: 0,
            device_specific_param: 0,
        };
        let bytes = data.to_bytes();
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[3], 0);
    }
}
