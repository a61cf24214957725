//! The Mass Storage function's lifecycle and command dispatch.
//!
//! [`MassStorageFunction`] owns the backing [`BlockImage`], the sense state,
//! and the Bulk-Only framer. [`MassStorageFunction::handle_command`] is the
//! pure, synchronous SCSI dispatcher; [`MassStorageFunction::service_one_command`]
//! is the async loop glue that drives it from real or fake endpoints.

use crate::block::BlockImage;
use crate::config::{MassStorageConfig, WritePerms};
use crate::endpoint::{EndpointChannel, OutEndpointBridge};
use crate::error::{DiskError, FunctionError, MassStorageError};
use crate::scsi::records::{InquiryData, ModeSense6Data, ReadCapacity10Data, RequestSenseData};
use crate::scsi::sense::{Sense, SenseKey};
use crate::scsi::{self, ScsiCommand};
use crate::transport::bbb::BulkOnlyFramer;
use crate::wire::{Cbw, Direction, CBW_LEN};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum LifecycleState {
    Created,
    BoundDescriptors,
    Enabled,
    Disabled,
    CleanedUp,
}

/// Invoked before touching the backing store on READ(10); the first one to
/// return `Some` short-circuits the real read.
pub type ReadInterceptor = Box<dyn FnMut(u32, u16) -> Option<Vec<u8>> + Send>;

/// Invoked after a WRITE(10) payload has arrived but before the write
/// permission policy is applied; observes only, cannot alter or suppress
/// the write.
pub type WriteInterceptor = Box<dyn FnMut(u32, &[u8]) + Send>;

pub struct MassStorageFunction {
    config: MassStorageConfig,
    image: Box<dyn BlockImage>,
    sense: Sense,
    framer: BulkOnlyFramer,
    state: LifecycleState,
    read_interceptors: Vec<ReadInterceptor>,
    write_interceptors: Vec<WriteInterceptor>,
    test_unit_ready_failure: Option<(SenseKey, u8, u8)>,
}

impl MassStorageFunction {
    pub fn new(config: MassStorageConfig, image: Box<dyn BlockImage>) -> Self {
        MassStorageFunction {
            config,
            image,
            sense: Sense::default(),
            framer: BulkOnlyFramer::new(),
            state: LifecycleState::Created,
            read_interceptors: Vec::new(),
            write_interceptors: Vec::new(),
            test_unit_ready_failure: None,
        }
    }

    pub fn config(&self) -> &MassStorageConfig {
        &self.config
    }

    /// Registers a read interceptor. Must be called before `ENABLE`; the
    /// dispatcher consults interceptors in registration order.
    pub fn add_read_interceptor(&mut self, interceptor: ReadInterceptor) {
        self.read_interceptors.push(interceptor);
    }

    /// Registers a write interceptor. Must be called before `ENABLE`.
    pub fn add_write_interceptor(&mut self, interceptor: WriteInterceptor) {
        self.write_interceptors.push(interceptor);
    }

    /// Test hook: makes the next TEST_UNIT_READY (and every one after, until
    /// cleared) fail with the given sense instead of reporting PASSED.
    pub fn set_test_unit_ready_failure(&mut self, sense: Option<(SenseKey, u8, u8)>) {
        self.test_unit_ready_failure = sense;
    }

    /// Marks the descriptor blob as written to `ep0`; must happen before
    /// the first ENABLE event.
    pub fn bind_descriptors(&mut self) {
        self.state = LifecycleState::BoundDescriptors;
    }

    pub fn handle_enable(&mut self) -> Result<(), FunctionError> {
        match self.state {
            LifecycleState::Enabled => Err(FunctionError::AlreadyEnabled),
            LifecycleState::Created
            | LifecycleState::BoundDescriptors
            | LifecycleState::Disabled => {
                self.state = LifecycleState::Enabled;
                log::info!("mass storage function enabled");
                Ok(())
            }
            LifecycleState::CleanedUp => Err(FunctionError::NotEnabled),
        }
    }

    pub fn handle_disable(&mut self) -> Result<(), FunctionError> {
        match self.state {
            LifecycleState::Enabled => {
                self.state = LifecycleState::Disabled;
                log::info!("mass storage function disabled");
                Ok(())
            }
            _ => Err(FunctionError::NotEnabled),
        }
    }

    pub fn cleanup(&mut self) {
        self.state = LifecycleState::CleanedUp;
        if let Err(err) = self.image.cleanup() {
            log::warn!("error flushing backing image on cleanup: {err}");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state == LifecycleState::Enabled
    }

    /// Bulk-only mass storage reset: discards any in-flight command and
    /// clears sense, without touching the lifecycle state.
    pub fn reset(&mut self) {
        self.framer.reset();
        self.sense.clear();
        log::info!("bulk-only mass storage reset");
    }

    /// Answers `GET_MAX_LUN`: this emulator always exposes a single LUN.
    pub fn get_max_lun(&self) -> u8 {
        0
    }

    /// Dispatches one already-parsed SCSI command. `write_payload` carries
    /// the host-to-device data stage for `WRITE(10)`, already accumulated
    /// to its full `transfer_length * block_size`.
    pub fn handle_command(
        &mut self,
        cmd: ScsiCommand,
        write_payload: Option<&[u8]>,
    ) -> Result<Vec<u8>, MassStorageError> {
        match cmd {
            ScsiCommand::TestUnitReady => match self.test_unit_ready_failure {
                Some((key, code, qualifier)) => {
                    Err(self.fail(key, code, qualifier, "test unit ready forced to fail"))
                }
                None => Ok(Vec::new()),
            },

            ScsiCommand::RequestSense { alloc_len, .. } => {
                let data = RequestSenseData {
                    sense_key: self.sense.key,
                    additional_sense_code: self.sense.code,
                    additional_sense_code_qualifier: self.sense.qualifier,
                };
                self.sense.clear();
                Ok(truncate_to_alloc_len(data.to_bytes().to_vec(), alloc_len as usize))
            }

            ScsiCommand::Inquiry {
                evpd, alloc_len, ..
            } => {
                if evpd {
                    return Err(self.fail(
                        SenseKey::IllegalRequest,
                        0x24,
                        0x00,
                        "vital product data pages are not supported",
                    ));
                }
                let data = InquiryData {
                    peripheral_qualifier: 0,
                    peripheral_type: 0,
                    removable: true,
                    version: 0x05,
                    response_data_format: 0x02,
                    vendor_id: crate::scsi::records::padded_ascii_field(&self.config.vendor_id),
                    product_id: crate::scsi::records::padded_ascii_field(&self.config.product_id),
                    product_version: crate::scsi::records::padded_ascii_field(
                        &self.config.product_version,
                    ),
                };
                Ok(truncate_to_alloc_len(
                    data.to_bytes().to_vec(),
                    alloc_len as usize,
                ))
            }

            ScsiCommand::ModeSense6 { alloc_len, .. } => Ok(truncate_to_alloc_len(
                ModeSense6Data {
                    medium_type: 0,
                    device_specific_param: 0,
                }
                .to_bytes()
                .to_vec(),
                alloc_len as usize,
            )),

            ScsiCommand::ReadCapacity10 { pmi } => {
                if pmi {
                    return Err(self.fail(
                        SenseKey::IllegalRequest,
                        0x24,
                        0x00,
                        "partial medium indicator is not supported",
                    ));
                }
                let capacity = self.image.capacity_blocks();
                if capacity == 0 {
                    return Err(self.fail(SenseKey::NotReady, 0x3a, 0x00, "no medium present"));
                }
                let last_lba = capacity - 1;
                if last_lba >= 0xffff_ffff {
                    return Err(self.fail(
                        SenseKey::IllegalRequest,
                        0x20,
                        0x00,
                        "capacity exceeds 32-bit addressing; READ CAPACITY(16) required",
                    ));
                }
                Ok(ReadCapacity10Data {
                    last_logical_block_address: last_lba as u32,
                    block_length: self.image.block_size(),
                }
                .to_bytes()
                .to_vec())
            }

            ScsiCommand::Read10 {
                lba,
                transfer_length,
            } => {
                for interceptor in self.read_interceptors.iter_mut() {
                    if let Some(bytes) = interceptor(lba, transfer_length) {
                        return Ok(bytes);
                    }
                }
                self.image
                    .read(lba as u64, transfer_length as u64)
                    .map_err(|err| self.disk_err_to_failure(err))
            }

            ScsiCommand::Write10 {
                lba,
                transfer_length,
            } => {
                let expected_len = transfer_length as usize * self.image.block_size() as usize;
                let payload = write_payload.unwrap_or(&[]);
                debug_assert_eq!(payload.len(), expected_len);

                for interceptor in self.write_interceptors.iter_mut() {
                    interceptor(lba, payload);
                }

                match self.config.write_perms {
                    WritePerms::Allow => {
                        self.image
                            .write(lba as u64, payload)
                            .map_err(|err| self.disk_err_to_failure(err))?;
                        Ok(Vec::new())
                    }
                    WritePerms::Deny => Err(self.fail(
                        SenseKey::DataProtect,
                        0x20,
                        0x02,
                        "writes are denied by policy",
                    )),
                    WritePerms::Drop => {
                        log::warn!("dropping write at lba={lba} len={transfer_length}");
                        Ok(Vec::new())
                    }
                }
            }

            ScsiCommand::Unsupported { opcode } => Err(self.fail(
                SenseKey::IllegalRequest,
                0x26,
                0x00,
                format!("unsupported opcode {opcode:#04x}"),
            )),
        }
    }

    fn fail(
        &mut self,
        key: SenseKey,
        code: u8,
        qualifier: u8,
        message: impl Into<String>,
    ) -> MassStorageError {
        let message = message.into();
        self.sense.set(key, code, qualifier);
        log::warn!("scsi command failed: {message}");
        MassStorageError::new(key, code, qualifier, message)
    }

    fn disk_err_to_failure(&mut self, err: DiskError) -> MassStorageError {
        match err {
            DiskError::OutOfRange { .. } => self.fail(
                SenseKey::IllegalRequest,
                0x21,
                0x00,
                format!("{err}"),
            ),
            DiskError::UnalignedWrite { .. } => self.fail(
                SenseKey::IllegalRequest,
                0x24,
                0x00,
                format!("{err}"),
            ),
            DiskError::Io(_) | DiskError::NotBlockAligned { .. } => {
                self.fail(SenseKey::MediumError, 0x11, 0x00, format!("{err}"))
            }
        }
    }

    /// Reads one CBW off `out_bridge`, accumulates its data stage (if any),
    /// dispatches the command, and writes the response + CSW to `in_ep`.
    /// Returns `Ok(false)` once the OUT endpoint has closed (the function
    /// was disabled).
    pub async fn service_one_command(
        &mut self,
        out_bridge: &mut OutEndpointBridge,
        in_ep: &mut dyn EndpointChannel,
    ) -> Result<bool, FunctionError> {
        let Some(cbw_bytes) = read_exact_from_bridge(out_bridge, CBW_LEN).await? else {
            return Ok(false);
        };

        let cbw: Cbw = self.framer.accept_cbw(&cbw_bytes)?.clone();
        let parsed = scsi::parse_cb(cbw.command());

        let write_payload = if let ScsiCommand::Write10 { transfer_length, .. } = parsed {
            let want = transfer_length as usize * self.image.block_size() as usize;
            read_exact_from_bridge(out_bridge, want).await?
        } else {
            None
        };
        let received_len = write_payload.as_ref().map(|p| p.len() as u32).unwrap_or(0);

        let result = self.handle_command(parsed, write_payload.as_deref());
        let failed = result.is_err();
        let response = result.unwrap_or_default();

        if cbw.direction == Direction::In && cbw.data_transfer_len > 0 {
            let (bytes, csw) = self.framer.finish(response, failed)?;
            in_ep.write_all(&bytes).map_err(FunctionError::Endpoint)?;
            in_ep.write_all(&csw.to_bytes()).map_err(FunctionError::Endpoint)?;
        } else {
            let csw = self.framer.finish_out(failed, received_len)?;
            in_ep.write_all(&csw.to_bytes()).map_err(FunctionError::Endpoint)?;
        }

        Ok(true)
    }
}

/// Applies a SCSI command's own allocation-length field to a fixed-size
/// response record. This must happen before the bytes reach the Bulk-Only
/// transport's residue logic: allocation-length truncation is ordinary SCSI
/// behavior, not a transport-level mismatch, and should never produce a
/// phase error.
fn truncate_to_alloc_len(mut bytes: Vec<u8>, alloc_len: usize) -> Vec<u8> {
    bytes.truncate(alloc_len);
    bytes
}

async fn read_exact_from_bridge(
    bridge: &mut OutEndpointBridge,
    want: usize,
) -> Result<Option<Vec<u8>>, FunctionError> {
    if want == 0 {
        return Ok(Some(Vec::new()));
    }
    let mut buf = Vec::with_capacity(want);
    while buf.len() < want {
        match bridge.recv().await {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Some(Err(err)) => return Err(FunctionError::Endpoint(err)),
            None => return Ok(None),
        }
    }
    buf.truncate(want);
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::memory::MemoryImage;

    fn make_function(write_perms: WritePerms) -> MassStorageFunction {
        let mut config = MassStorageConfig::new("/tmp/doesnotmatter", 512);
        config.write_perms = write_perms;
        let image = MemoryImage::new(512, 16).unwrap();
        MassStorageFunction::new(config, Box::new(image))
    }

    #[test]
    fn enable_disable_lifecycle_is_enforced() {
        let mut func = make_function(WritePerms::Allow);
        assert!(func.handle_enable().is_ok());
        assert!(matches!(
            func.handle_enable(),
            Err(FunctionError::AlreadyEnabled)
        ));
        assert!(func.handle_disable().is_ok());
        assert!(matches!(func.handle_disable(), Err(FunctionError::NotEnabled)));
    }

    #[test]
    fn inquiry_with_evpd_fails_and_sets_sense() {
        let mut func = make_function(WritePerms::Allow);
        let result = func.handle_command(
            ScsiCommand::Inquiry {
                evpd: true,
                page_code: 0x80,
                alloc_len: 0xff,
            },
            None,
        );
        assert!(result.is_err());

        let sense_bytes = func
            .handle_command(
                ScsiCommand::RequestSense {
                    desc: false,
                    alloc_len: 18,
                },
                None,
            )
            .unwrap();
        assert_eq!(sense_bytes[2] & 0x0f, u8::from(SenseKey::IllegalRequest));
    }

    #[test]
    fn request_sense_clears_after_reporting() {
        let mut func = make_function(WritePerms::Allow);
        let _ = func.handle_command(
            ScsiCommand::ReadCapacity10 { pmi: true },
            None,
        );
        let first = func
            .handle_command(
                ScsiCommand::RequestSense {
                    desc: false,
                    alloc_len: 18,
                },
                None,
            )
            .unwrap();
        assert_ne!(first[2] & 0x0f, u8::from(SenseKey::NoSense));

        let second = func
            .handle_command(
                ScsiCommand::RequestSense {
                    desc: false,
                    alloc_len: 18,
                },
                None,
            )
            .unwrap();
        assert_eq!(second[2] & 0x0f, u8::from(SenseKey::NoSense));
    }

    #[test]
    fn write_deny_policy_fails_without_touching_image() {
        let mut func = make_function(WritePerms::Deny);
        let payload = vec![0xAB; 512];
        let result = func.handle_command(
            ScsiCommand::Write10 {
                lba: 0,
                transfer_length: 1,
            },
            Some(&payload),
        );
        assert!(result.is_err());

        let data = func
            .handle_command(
                ScsiCommand::Read10 {
                    lba: 0,
                    transfer_length: 1,
                },
                None,
            )
            .unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn write_drop_policy_reports_success_but_drops_data() {
        let mut func = make_function(WritePerms::Drop);
        let payload = vec![0xCD; 512];
        let result = func.handle_command(
            ScsiCommand::Write10 {
                lba: 0,
                transfer_length: 1,
            },
            Some(&payload),
        );
        assert!(result.is_ok());

        let data = func
            .handle_command(
                ScsiCommand::Read10 {
                    lba: 0,
                    transfer_length: 1,
                },
                None,
            )
            .unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn read_out_of_range_maps_to_illegal_request() {
        let mut func = make_function(WritePerms::Allow);
        let result = func.handle_command(
            ScsiCommand::Read10 {
                lba: 100,
                transfer_length: 1,
            },
            None,
        );
        match result {
            Err(err) => assert_eq!(err.sense_key, SenseKey::IllegalRequest),
            Ok(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn allocation_length_truncates_fixed_responses_before_transport() {
        let mut func = make_function(WritePerms::Allow);

        let sense = func
            .handle_command(
                ScsiCommand::RequestSense {
                    desc: false,
                    alloc_len: 8,
                },
                None,
            )
            .unwrap();
        assert_eq!(sense.len(), 8);

        let inquiry = func
            .handle_command(
                ScsiCommand::Inquiry {
                    evpd: false,
                    page_code: 0,
                    alloc_len: 5,
                },
                None,
            )
            .unwrap();
        assert_eq!(inquiry.len(), 5);

        let mode_sense = func
            .handle_command(
                ScsiCommand::ModeSense6 {
                    dbd: false,
                    page_control: crate::scsi::PageControl::CurrentValues,
                    page_code: 0x3f,
                    alloc_len: 2,
                },
                None,
            )
            .unwrap();
        assert_eq!(mode_sense.len(), 2);
    }

    #[test]
    fn test_unit_ready_hook_forces_failure() {
        let mut func = make_function(WritePerms::Allow);
        assert!(func.handle_command(ScsiCommand::TestUnitReady, None).is_ok());

        func.set_test_unit_ready_failure(Some((SenseKey::NotReady, 0x3a, 0x00)));
        let result = func.handle_command(ScsiCommand::TestUnitReady, None);
        match result {
            Err(err) => assert_eq!(err.sense_key, SenseKey::NotReady),
            Ok(_) => panic!("expected forced failure"),
        }

        func.set_test_unit_ready_failure(None);
        assert!(func.handle_command(ScsiCommand::TestUnitReady, None).is_ok());
    }

    #[test]
    fn read_interceptor_short_circuits_backing_store() {
        let mut func = make_function(WritePerms::Allow);
        func.add_read_interceptor(Box::new(|lba, count| {
            if lba == 2 {
                Some(vec![0x42; count as usize * 512])
            } else {
                None
            }
        }));

        let data = func
            .handle_command(
                ScsiCommand::Read10 {
                    lba: 2,
                    transfer_length: 1,
                },
                None,
            )
            .unwrap();
        assert_eq!(data, vec![0x42; 512]);
    }

    #[test]
    fn write_interceptor_observes_without_altering_write() {
        let mut func = make_function(WritePerms::Allow);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = std::sync::Arc::clone(&seen);
        func.add_write_interceptor(Box::new(move |lba, data| {
            seen_clone.lock().unwrap().push((lba, data.to_vec()));
        }));

        let payload = vec![0x7e; 512];
        func.handle_command(
            ScsiCommand::Write10 {
                lba: 1,
                transfer_length: 1,
            },
            Some(&payload),
        )
        .unwrap();

        let observed = seen.lock().unwrap();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0], (1, payload.clone()));

        let read_back = func
            .handle_command(
                ScsiCommand::Read10 {
                    lba: 1,
                    transfer_length: 1,
                },
                None,
            )
            .unwrap();
        assert_eq!(read_back, payload);
    }

    fn sample_cbw_bytes(dir_in: bool, data_len: u32, cb: &[u8]) -> Vec<u8> {
        let mut bytes = vec![];
        bytes.extend_from_slice(&crate::wire::CBW_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.push(if dir_in { 0x80 } else { 0x00 });
        bytes.push(0x00);
        bytes.push(cb.len() as u8);
        let mut cb_slot = [0u8; 16];
        cb_slot[..cb.len()].copy_from_slice(cb);
        bytes.extend_from_slice(&cb_slot);
        bytes
    }

    #[test]
    fn reset_clears_sense_and_in_flight_command() {
        let mut func = make_function(WritePerms::Allow);
        let _ = func.handle_command(ScsiCommand::ReadCapacity10 { pmi: true }, None);
        let cbw_bytes = sample_cbw_bytes(true, 0xff, &[0x12, 0, 0, 0, 0xff, 0]);
        assert!(func.framer.accept_cbw(&cbw_bytes).is_ok());
        assert!(func.framer.current().is_some());

        func.reset();

        assert!(func.framer.current().is_none());
        let sense = func
            .handle_command(
                ScsiCommand::RequestSense {
                    desc: false,
                    alloc_len: 18,
                },
                None,
            )
            .unwrap();
        assert_eq!(sense[2] & 0x0f, u8::from(SenseKey::NoSense));
    }
}
