//! Bulk-Only Transport envelopes: the Command Block Wrapper (CBW) and the
//! Command Status Wrapper (CSW). Both are fixed little-endian layouts —
//! see USB Mass Storage Class Bulk-Only Transport, sections 5.1 and 5.2.

use crate::error::BbbError;

pub const CBW_SIGNATURE: u32 = 0x4342_5355;
pub const CSW_SIGNATURE: u32 = 0x5342_5355;

pub const CBW_LEN: usize = 31;
pub const CSW_LEN: usize = 13;

const MIN_CB_LEN: u8 = 1;
const MAX_CB_LEN: u8 = 16;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Out,
    In,
}

/// A parsed Command Block Wrapper.
///
/// `cb` is the raw 16-byte Command Block slot; only the first `cb_len` bytes
/// are meaningful.
#[derive(Debug, Clone)]
pub struct Cbw {
    pub tag: u32,
    pub data_transfer_len: u32,
    pub direction: Direction,
    pub lun: u8,
    pub cb_len: u8,
    pub cb: [u8; 16],
}

impl Cbw {
    /// Returns the meaningful slice of the command block.
    pub fn command(&self) -> &[u8] {
        &self.cb[..self.cb_len as usize]
    }

    /// Parses a 31-byte little-endian CBW. `bytes` must be exactly [`CBW_LEN`] long.
    pub fn parse(bytes: &[u8]) -> Result<Self, BbbError> {
        if bytes.len() < CBW_LEN {
            return Err(BbbError::ShortCbw(bytes.len()));
        }

        let signature = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if signature != CBW_SIGNATURE {
            return Err(BbbError::InvalidSignature);
        }

        let tag = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let data_transfer_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let flags = bytes[12];
        let direction = if flags & 0b1000_0000 != 0 {
            Direction::In
        } else {
            Direction::Out
        };
        let lun = bytes[13] & 0x0f;
        let cb_len = bytes[14] & 0b0001_1111;

        if !(MIN_CB_LEN..=MAX_CB_LEN).contains(&cb_len) {
            return Err(BbbError::InvalidCbLength(cb_len));
        }

        let mut cb = [0u8; 16];
        cb.copy_from_slice(&bytes[15..31]);

        Ok(Cbw {
            tag,
            data_transfer_len,
            direction,
            lun,
            cb_len,
            cb,
        })
    }
}

/// The status of a Mass Storage command, carried in the CSW.
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum CommandStatus {
    #[default]
    Passed = 0x00,
    Failed = 0x01,
    PhaseError = 0x02,
}

#[derive(Debug, Clone)]
pub struct Csw {
    pub tag: u32,
    pub data_residue: u32,
    pub status: CommandStatus,
}

impl Csw {
    pub fn to_bytes(&self) -> [u8; CSW_LEN] {
        let mut out = [0u8; CSW_LEN];
        out[0..4].copy_from_slice(&CSW_SIGNATURE.to_le_bytes());
        out[4..8].copy_from_slice(&self.tag.to_le_bytes());
        out[8..12].copy_from_slice(&self.data_residue.to_le_bytes());
        out[12] = self.status as u8;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BbbError> {
        if bytes.len() < CSW_LEN {
            return Err(BbbError::ShortCbw(bytes.len()));
        }
        let signature = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if signature != CSW_SIGNATURE {
            return Err(BbbError::InvalidSignature);
        }
        let tag = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let data_residue = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let status = match bytes[12] {
            0x00 => CommandStatus::Passed,
            0x01 => CommandStatus::Failed,
            0x02 => CommandStatus::PhaseError,
            other => return Err(BbbError::InvalidCbLength(other)), // reuse: "bad field" case
        };
        Ok(Csw {
            tag,
            data_residue,
            status,
        })
    }
}

/// Computes the residue/phase-error outcome for a response of `produced` bytes
/// against a CBW that requested `requested` bytes. Returns the (possibly
/// padded/truncated) response bytes, the residue, and whether the result is
/// a phase error.
pub fn apply_residue_rules(requested: u32, mut produced: Vec<u8>) -> (Vec<u8>, u32, bool) {
    let produced_len = produced.len() as u32;
    if produced_len < requested {
        let residue = requested - produced_len;
        produced.resize(requested as usize, 0);
        (produced, residue, false)
    } else if produced_len > requested {
        produced.truncate(requested as usize);
        (produced, 0, true)
    } else {
        (produced, 0, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cbw_bytes(dir_in: bool, data_len: u32, cb: &[u8]) -> Vec<u8> {
        let mut bytes = vec![];
        bytes.extend_from_slice(&CBW_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&0xdead_beefu32.to_le_bytes()); // tag
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.push(if dir_in { 0x80 } else { 0x00 });
        bytes.push(0x00); // lun
        bytes.push(cb.len() as u8);
        let mut cb_slot = [0u8; 16];
        cb_slot[..cb.len()].copy_from_slice(cb);
        bytes.extend_from_slice(&cb_slot);
        bytes
    }

    #[test]
    fn parses_valid_cbw() {
        let bytes = sample_cbw_bytes(true, 512, &[0x28, 0, 0, 0, 0, 0, 0, 0, 1, 0]);
        let cbw = Cbw::parse(&bytes).unwrap();
        assert_eq!(cbw.tag, 0xdead_beef);
        assert_eq!(cbw.data_transfer_len, 512);
        assert_eq!(cbw.direction, Direction::In);
        assert_eq!(cbw.cb_len, 10);
        assert_eq!(cbw.command(), &[0x28, 0, 0, 0, 0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = sample_cbw_bytes(false, 0, &[0x00]);
        bytes[0] = 0xff;
        assert!(matches!(Cbw::parse(&bytes), Err(BbbError::InvalidSignature)));
    }

    #[test]
    fn rejects_cb_length_out_of_range() {
        let mut bytes = sample_cbw_bytes(false, 0, &[0x00]);
        bytes[14] = 0; // cb_len = 0, invalid
        assert!(matches!(
            Cbw::parse(&bytes),
            Err(BbbError::InvalidCbLength(0))
        ));
    }

    #[test]
    fn csw_round_trips() {
        let csw = Csw {
            tag: 42,
            data_residue: 7,
            status: CommandStatus::Failed,
        };
        let bytes = csw.to_bytes();
        let decoded = Csw::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.tag, csw.tag);
        assert_eq!(decoded.data_residue, csw.data_residue);
        assert_eq!(decoded.status, csw.status);
    }

    #[test]
    fn residue_rules_short_response_pads_with_zero() {
        let (bytes, residue, phase_error) = apply_residue_rules(1024, vec![0xAA; 512]);
        assert_eq!(bytes.len(), 1024);
        assert!(bytes[512..].iter().all(|&b| b == 0));
        assert_eq!(residue, 512);
        assert!(!phase_error);
    }

    #[test]
    fn residue_rules_long_response_truncates_and_phase_errors() {
        let (bytes, residue, phase_error) = apply_residue_rules(1024, vec![0xAA; 2048]);
        assert_eq!(bytes.len(), 1024);
        assert_eq!(residue, 0);
        assert!(phase_error);
    }

    #[test]
    fn residue_rules_exact_response_has_zero_residue() {
        let (bytes, residue, phase_error) = apply_residue_rules(512, vec![0xAA; 512]);
        assert_eq!(bytes.len(), 512);
        assert_eq!(residue, 0);
        assert!(!phase_error);
    }
}
