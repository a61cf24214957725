//! Binds a [`MassStorageFunction`] to a FunctionFS mount point and drives
//! its control-event and bulk-command loops until cancelled.
//!
//! Mirrors the three-file layout a FunctionFS gadget instance always has:
//! `ep0` (control, event-driven), `ep1` (bulk IN), `ep2` (bulk OUT).

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::descriptors::{self, CtrlRequest, FfsEventType};
use crate::endpoint::{map_io_err, EndpointChannel, FfsEndpoint, OutEndpointBridge};
use crate::error::FunctionError;
use crate::function::MassStorageFunction;
use crate::transport::{CLASS_SPECIFIC_BULK_ONLY_MASS_STORAGE_RESET, CLASS_SPECIFIC_GET_MAX_LUN};

const FFS_EVENT_LEN: usize = 12;
const BULK_CHUNK_SIZE: usize = 16 * 1024;

pub async fn run(
    mut function: MassStorageFunction,
    mount_point: std::path::PathBuf,
    cancel: CancellationToken,
) -> Result<(), FunctionError> {
    let ep0_path = mount_point.join("ep0");
    let mut ep0 = FfsEndpoint::open(&ep0_path).map_err(map_io_err)?;

    ep0.write_all(&descriptors::build_descriptors_v2(
        function.config().hs_packet_size,
    ))
    .map_err(map_io_err)?;
    ep0.write_all(&descriptors::build_strings("evilstor mass storage"))
        .map_err(map_io_err)?;
    function.bind_descriptors();
    log::info!("descriptors bound at {}", ep0_path.display());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let ep0_reader = ep0.try_clone().map_err(map_io_err)?;
    spawn_event_reader(ep0_reader, event_tx);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("shutdown requested, leaving function loop");
                function.cleanup();
                return Ok(());
            }
            event = event_rx.recv() => {
                match event {
                    Some(Ok(FfsEventEnvelope::Event(FfsEventType::Enable))) => {
                        function.handle_enable()?;
                        run_bulk_session(&mut function, &mount_point, &cancel).await?;
                    }
                    Some(Ok(FfsEventEnvelope::Event(FfsEventType::Disable))) => {
                        let _ = function.handle_disable();
                    }
                    Some(Ok(FfsEventEnvelope::Setup(req))) => {
                        handle_setup(&mut ep0, &mut function, req)?;
                    }
                    Some(Ok(FfsEventEnvelope::Event(_))) => {}
                    Some(Err(err)) => return Err(FunctionError::Endpoint(err)),
                    None => return Ok(()),
                }
            }
        }
    }
}

async fn run_bulk_session(
    function: &mut MassStorageFunction,
    mount_point: &std::path::Path,
    cancel: &CancellationToken,
) -> Result<(), FunctionError> {
    let mut in_ep = FfsEndpoint::open(mount_point.join("ep1")).map_err(map_io_err)?;
    let mut out_bridge = OutEndpointBridge::spawn(mount_point.join("ep2"), BULK_CHUNK_SIZE);

    while function.is_enabled() {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = function.service_one_command(&mut out_bridge, &mut in_ep) => {
                if !result? {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn handle_setup(
    ep0: &mut FfsEndpoint,
    function: &mut MassStorageFunction,
    req: CtrlRequest,
) -> Result<(), FunctionError> {
    match req.request {
        CLASS_SPECIFIC_GET_MAX_LUN if req.is_class_interface_request() => {
            if req.is_device_to_host() {
                ep0.write_all(&[function.get_max_lun()])
                    .map_err(map_io_err)?;
            }
        }
        CLASS_SPECIFIC_BULK_ONLY_MASS_STORAGE_RESET if req.is_class_interface_request() => {
            function.reset();
        }
        other => {
            log::debug!("unhandled class request {other:#04x}, using generic ep0 handling");
            if req.is_device_to_host() {
                ep0.write_all(&[]).map_err(map_io_err)?;
            } else {
                let mut drain = vec![0u8; (req.length as usize).min(1000)];
                if !drain.is_empty() {
                    let _ = ep0.read_exact(&mut drain);
                }
            }
        }
    }
    Ok(())
}

enum FfsEventEnvelope {
    Event(FfsEventType),
    Setup(CtrlRequest),
}

fn spawn_event_reader(
    mut ep0_reader: std::fs::File,
    tx: mpsc::UnboundedSender<std::io::Result<FfsEventEnvelope>>,
) {
    use std::io::Read;

    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; FFS_EVENT_LEN];
        loop {
            match ep0_reader.read_exact(&mut buf) {
                Ok(()) => {
                    let event_type = buf[8];
                    let envelope = if event_type == FfsEventType::Setup as u8 {
                        match CtrlRequest::parse(&buf[0..8]) {
                            Some(req) => FfsEventEnvelope::Setup(req),
                            None => continue,
                        }
                    } else {
                        match FfsEventType::from_byte(event_type) {
                            Some(kind) => FfsEventEnvelope::Event(kind),
                            None => continue,
                        }
                    };
                    if tx.send(Ok(envelope)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err));
                    break;
                }
            }
        }
    });
}

/// A shared handle used by tests to toggle a [`crate::block::toggle::ToggleImage`]
/// concurrently with an in-flight command, reproducing the TOCTOU scenario.
pub type SharedToggle = Arc<Mutex<crate::block::toggle::ToggleImage>>;
