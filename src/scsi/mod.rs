//! SCSI Transparent Command Set: CDB parsing and response records.

pub mod records;
pub mod sense;

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const OP_TEST_UNIT_READY: u8 = 0x00;
pub const OP_REQUEST_SENSE: u8 = 0x03;
pub const OP_INQUIRY: u8 = 0x12;
pub const OP_MODE_SENSE_6: u8 = 0x1a;
pub const OP_READ_CAPACITY_10: u8 = 0x25;
pub const OP_READ_10: u8 = 0x28;
pub const OP_WRITE_10: u8 = 0x2a;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
pub enum PageControl {
    CurrentValues = 0b00,
    ChangeableValues = 0b01,
    DefaultValues = 0b10,
    SavedValues = 0b11,
}

#[derive(Debug, Copy, Clone)]
pub enum ScsiCommand {
    TestUnitReady,
    RequestSense {
        desc: bool,
        alloc_len: u8,
    },
    Inquiry {
        evpd: bool,
        page_code: u8,
        alloc_len: u16,
    },
    ModeSense6 {
        dbd: bool,
        page_control: PageControl,
        page_code: u8,
        alloc_len: u8,
    },
    ReadCapacity10 {
        pmi: bool,
    },
    Read10 {
        lba: u32,
        transfer_length: u16,
    },
    Write10 {
        lba: u32,
        transfer_length: u16,
    },
    Unsupported {
        opcode: u8,
    },
}

/// Parses a raw Command Block into a [`ScsiCommand`]. `cb` is the meaningful
/// slice reported by the CBW (`cb_len` bytes, not the full 16-byte slot).
pub fn parse_cb(cb: &[u8]) -> ScsiCommand {
    let opcode = cb[0];
    match opcode {
        OP_TEST_UNIT_READY => ScsiCommand::TestUnitReady,

        OP_REQUEST_SENSE => ScsiCommand::RequestSense {
            desc: cb[1] & 0b0000_0001 != 0,
            alloc_len: cb[4],
        },

        OP_INQUIRY => ScsiCommand::Inquiry {
            evpd: cb[1] & 0b0000_0001 != 0,
            page_code: cb[2],
            alloc_len: u16::from_be_bytes([cb[3], cb[4]]),
        },

        OP_MODE_SENSE_6 => ScsiCommand::ModeSense6 {
            dbd: cb[1] & 0b0000_1000 != 0,
            page_control: PageControl::try_from(cb[2] >> 6).unwrap_or(PageControl::CurrentValues),
            page_code: cb[2] & 0b0011_1111,
            alloc_len: cb[4],
        },

        OP_READ_CAPACITY_10 => ScsiCommand::ReadCapacity10 {
            pmi: cb[8] & 0b0000_0001 != 0,
        },

        OP_READ_10 => ScsiCommand::Read10 {
            lba: u32::from_be_bytes(cb[2..6].try_into().unwrap()),
            transfer_length: u16::from_be_bytes([cb[7], cb[8]]),
        },

        OP_WRITE_10 => ScsiCommand::Write10 {
            lba: u32::from_be_bytes(cb[2..6].try_into().unwrap()),
            transfer_length: u16::from_be_bytes([cb[7], cb[8]]),
        },

        other => ScsiCommand::Unsupported { opcode: other },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inquiry_with_evpd() {
        let cb = [OP_INQUIRY, 0x01, 0x80, 0x00, 0xff, 0x00];
        match parse_cb(&cb) {
            ScsiCommand::Inquiry {
                evpd,
                page_code,
                alloc_len,
            } => {
                assert!(evpd);
                assert_eq!(page_code, 0x80);
                assert_eq!(alloc_len, 0xff);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_read10() {
        let cb = [OP_READ_10, 0, 0, 0, 0, 10, 0, 0, 4, 0];
        match parse_cb(&cb) {
            ScsiCommand::Read10 {
                lba,
                transfer_length,
            } => {
                assert_eq!(lba, 10);
                assert_eq!(transfer_length, 4);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_write10() {
        let cb = [OP_WRITE_10, 0, 0, 0, 1, 0, 0, 0, 2, 0];
        match parse_cb(&cb) {
            ScsiCommand::Write10 {
                lba,
                transfer_length,
            } => {
                assert_eq!(lba, 256);
                assert_eq!(transfer_length, 2);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_read_capacity_pmi_bit() {
        let cb = [OP_READ_CAPACITY_10, 0, 0, 0, 0, 0, 0, 0, 0x01, 0];
        match parse_cb(&cb) {
            ScsiCommand::ReadCapacity10 { pmi } => assert!(pmi),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn unsupported_opcode_is_captured() {
        match parse_cb(&[0x2f, 0, 0, 0, 0, 0]) {
            ScsiCommand::Unsupported { opcode } => assert_eq!(opcode, 0x2f),
            other => panic!("unexpected parse: {other:?}"),
        }
    }
}
