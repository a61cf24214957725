//! Endpoint I/O abstraction.
//!
//! A real function instance talks to the kernel through FunctionFS endpoint
//! files (`ep0`, `ep1`, `ep2`, ...) opened as regular files. Reads from the
//! OUT endpoint block in the kernel, so each OUT endpoint gets its own
//! blocking bridge thread (`tokio::task::spawn_blocking`) feeding an
//! unbounded channel the async function loop can `.recv()` from.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::error::FunctionError;

/// One direction of one endpoint: something the function loop can write
/// response bytes to, or read a channel of inbound chunks from.
pub trait EndpointChannel: Send {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;
}

/// A FunctionFS endpoint file opened for writing (ep0 control replies, or an
/// IN bulk endpoint).
pub struct FfsEndpoint {
    file: File,
}

impl FfsEndpoint {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(FfsEndpoint { file })
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.file.read_exact(buf)
    }

    pub fn fd(&self) -> i32 {
        self.file.as_raw_fd()
    }

    /// Duplicates the underlying fd so events can be read from a blocking
    /// background thread while the owning task still writes control replies.
    pub fn try_clone(&self) -> std::io::Result<File> {
        self.file.try_clone()
    }
}

impl EndpointChannel for FfsEndpoint {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all(data)
    }
}

/// Bridges a blocking OUT-endpoint file to an async `mpsc` channel: one OS
/// thread per endpoint, parked in `read()` until the kernel has bytes or the
/// function is torn down.
pub struct OutEndpointBridge {
    receiver: mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>>,
    _handle: Option<tokio::task::JoinHandle<()>>,
}

impl OutEndpointBridge {
    pub fn spawn(path: impl AsRef<Path> + Send + 'static, chunk_size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let path: PathBuf = path.as_ref().to_path_buf();

        let handle = tokio::task::spawn_blocking(move || {
            let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(f) => f,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return;
                }
            };
            let mut buf = vec![0u8; chunk_size];
            loop {
                match file.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
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

        OutEndpointBridge {
            receiver: rx,
            _handle: Some(handle),
        }
    }

    /// Builds a bridge directly from a channel, bypassing the blocking
    /// reader thread. Used by tests to script OUT-endpoint traffic.
    pub fn from_channel(receiver: mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>>) -> Self {
        OutEndpointBridge {
            receiver,
            _handle: None,
        }
    }

    pub async fn recv(&mut self) -> Option<std::io::Result<Vec<u8>>> {
        self.receiver.recv().await
    }
}

/// An in-memory capture of everything written to the IN endpoint, used by
/// integration tests to drive a [`crate::function::MassStorageFunction`]
/// without touching FunctionFS. Pair with
/// [`OutEndpointBridge::from_channel`] to script the OUT side.
#[derive(Debug, Default)]
pub struct DummyInEndpoint {
    pub writes: Vec<Vec<u8>>,
}

impl DummyInEndpoint {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointChannel for DummyInEndpoint {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.writes.push(data.to_vec());
        Ok(())
    }
}

pub fn map_io_err(err: std::io::Error) -> FunctionError {
    FunctionError::Endpoint(err)
}
