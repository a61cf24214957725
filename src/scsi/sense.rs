//! SCSI sense state, held per function instance and reported by `REQUEST_SENSE`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// SPC-3 sense keys (the low 4 bits of the sense key byte).
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
pub enum SenseKey {
    NoSense = 0x00,
    RecoveredError = 0x01,
    NotReady = 0x02,
    MediumError = 0x03,
    HardwareError = 0x04,
    IllegalRequest = 0x05,
    UnitAttention = 0x06,
    DataProtect = 0x07,
    BlankCheck = 0x08,
    VendorSpecific = 0x09,
    CopyAborted = 0x0a,
    AbortedCommand = 0x0b,
    VolumeOverflow = 0x0d,
    Miscompare = 0x0e,
}

/// The three-integer sense triple a function instance carries between commands.
///
/// Initialized to `NO_SENSE/0/0`; set by a failed command; consumed and reset
/// to `NO_SENSE/0/0` by the next `REQUEST_SENSE`.
#[derive(Debug, Copy, Clone)]
pub struct Sense {
    pub key: SenseKey,
    pub code: u8,
    pub qualifier: u8,
}

impl Default for Sense {
    fn default() -> Self {
        Self {
            key: SenseKey::NoSense,
            code: 0,
            qualifier: 0,
        }
    }
}

impl Sense {
    pub fn set(&mut self, key: SenseKey, code: u8, qualifier: u8) {
        *self = Sense {
            key,
            code,
            qualifier,
        };
    }

    pub fn clear(&mut self) {
        *self = Sense::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_no_sense() {
        let sense = Sense::default();
        assert_eq!(sense.key, SenseKey::NoSense);
        assert_eq!(sense.code, 0);
        assert_eq!(sense.qualifier, 0);
    }

    #[test]
    fn set_then_clear_round_trips_to_default() {
        let mut sense = Sense::default();
        sense.set(SenseKey::DataProtect, 0x20, 0x02);
        assert_eq!(sense.key, SenseKey::DataProtect);
        sense.clear();
        assert_eq!(sense.key, SenseKey::NoSense);
        assert_eq!(sense.code, 0);
        assert_eq!(sense.qualifier, 0);
    }
}
