//! Bulk Only Transport (BBB) state machine.
//!
//! This is a pure, synchronous framer: it does not touch endpoints itself.
//! The function loop feeds it raw bytes read from the OUT endpoint and asks
//! it to build the bytes to write back to the IN endpoint, so it can be
//! driven from either the real FunctionFS endpoints or the in-memory test
//! double.

use crate::wire::{apply_residue_rules, Cbw, CommandStatus, Csw};
use crate::error::BbbError;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    Idle,
    CommandInFlight,
}

/// Tracks exactly one outstanding command at a time — this emulator never
/// pipelines CBWs, matching the spec's single-in-flight-command model.
pub struct BulkOnlyFramer {
    state: State,
    current: Option<Cbw>,
}

impl Default for BulkOnlyFramer {
    fn default() -> Self {
        BulkOnlyFramer {
            state: State::Idle,
            current: None,
        }
    }
}

impl BulkOnlyFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a CBW read off the OUT endpoint and begins tracking it.
    pub fn accept_cbw(&mut self, bytes: &[u8]) -> Result<&Cbw, BbbError> {
        let cbw = Cbw::parse(bytes)?;
        self.current = Some(cbw);
        self.state = State::CommandInFlight;
        Ok(self.current.as_ref().unwrap())
    }

    /// The CBW currently being serviced, if any.
    pub fn current(&self) -> Option<&Cbw> {
        self.current.as_ref()
    }

    /// Discards any in-flight command and returns to `AwaitCBW`, for a host
    /// bulk-only mass storage reset.
    pub fn reset(&mut self) {
        self.current = None;
        self.state = State::Idle;
    }

    /// Applies the residue/phase-error rules to `response` and builds the
    /// CSW that concludes the in-flight command. `command_failed` is the
    /// SCSI-level outcome (sense set or not); a data-length mismatch can
    /// still force `PhaseError` regardless of that outcome.
    pub fn finish(&mut self, response: Vec<u8>, command_failed: bool) -> Result<(Vec<u8>, Csw), BbbError> {
        let cbw = self
            .current
            .take()
            .ok_or(BbbError::UnexpectedData)?;
        self.state = State::Idle;

        let (bytes, residue, phase_error) = apply_residue_rules(cbw.data_transfer_len, response);
        let status = if phase_error {
            CommandStatus::PhaseError
        } else if command_failed {
            CommandStatus::Failed
        } else {
            CommandStatus::Passed
        };

        Ok((
            bytes,
            Csw {
                tag: cbw.tag,
                data_residue: residue,
                status,
            },
        ))
    }

    /// Concludes a command with no IN data stage: either a genuinely
    /// data-free command (`data_transfer_len == 0`), or one whose data
    /// stage was host-to-device and has already been consumed.
    pub fn finish_no_data(&mut self, command_failed: bool) -> Result<Csw, BbbError> {
        self.finish_out(command_failed, 0)
    }

    /// Concludes a host-to-device (OUT) data command, given how many bytes
    /// of the declared `dCBWDataTransferLength` were actually received.
    pub fn finish_out(&mut self, command_failed: bool, received_len: u32) -> Result<Csw, BbbError> {
        let cbw = self
            .current
            .take()
            .ok_or(BbbError::UnexpectedData)?;
        self.state = State::Idle;

        let status = if command_failed {
            CommandStatus::Failed
        } else {
            CommandStatus::Passed
        };

        Ok(Csw {
            tag: cbw.tag,
            data_residue: cbw.data_transfer_len.saturating_sub(received_len),
            status,
        })
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }
}
