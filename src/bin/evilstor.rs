//! Command-line front door: assembles a backing image stack from flags and
//! runs it as a FunctionFS Mass Storage gadget until interrupted.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use evilstor::block::cow::CowImage;
use evilstor::block::file::FileImage;
use evilstor::block::logger::IoLogger;
use evilstor::block::memory::MemoryImage;
use evilstor::block::BlockImage;
use evilstor::config::{MassStorageConfig, WritePerms};
use evilstor::function::MassStorageFunction;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackingKind {
    File,
    Memory,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WritePermsArg {
    Allow,
    Deny,
    Drop,
}

impl From<WritePermsArg> for WritePerms {
    fn from(value: WritePermsArg) -> Self {
        match value {
            WritePermsArg::Allow => WritePerms::Allow,
            WritePermsArg::Deny => WritePerms::Deny,
            WritePermsArg::Drop => WritePerms::Drop,
        }
    }
}

/// User-space USB Mass Storage gadget for storage security research.
#[derive(Debug, Parser)]
#[command(name = "evilstor", author, version, about)]
struct Args {
    /// FunctionFS mount point (directory containing ep0/ep1/ep2).
    #[arg(long)]
    mount: PathBuf,

    /// Backing store kind.
    #[arg(long, value_enum, default_value = "file")]
    backing: BackingKind,

    /// Path to the backing file (ignored for --backing memory).
    #[arg(long)]
    image: Option<PathBuf>,

    /// Capacity in whole blocks; required when creating a new backing file
    /// or memory image.
    #[arg(long)]
    capacity_blocks: Option<u64>,

    #[arg(long, default_value_t = 512)]
    block_size: u32,

    /// Wraps the backing image in a copy-on-write overlay at this path;
    /// reads are served from the overlay once a block has been written.
    #[arg(long)]
    cow_overlay: Option<PathBuf>,

    /// Appends a binary i/o audit trail to this path.
    #[arg(long)]
    io_log: Option<PathBuf>,

    /// Includes the raw read/written bytes in each i/o log entry, not just
    /// the offset and count. Ignored without --io-log.
    #[arg(long)]
    io_log_data: bool,

    #[arg(long, value_enum, default_value = "allow")]
    write_perms: WritePermsArg,
}

fn build_image(args: &Args) -> Result<Box<dyn BlockImage>> {
    let base: Box<dyn BlockImage> = match args.backing {
        BackingKind::Memory => {
            let capacity = args
                .capacity_blocks
                .context("--capacity-blocks is required for a memory-backed image")?;
            Box::new(MemoryImage::new(args.block_size, capacity)?)
        }
        BackingKind::File => {
            let path = args
                .image
                .as_ref()
                .context("--image is required for a file-backed image")?;
            if path.exists() {
                Box::new(FileImage::open(path, args.block_size)?)
            } else {
                let capacity = args
                    .capacity_blocks
                    .context("--capacity-blocks is required to create a new image")?;
                Box::new(FileImage::create(path, args.block_size, capacity)?)
            }
        }
    };

    let overlaid: Box<dyn BlockImage> = match &args.cow_overlay {
        Some(overlay_path) => Box::new(CowImage::open(base, overlay_path)?),
        None => base,
    };

    let logged: Box<dyn BlockImage> = match &args.io_log {
        Some(log_path) => {
            let sink = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("opening i/o log at {}", log_path.display()))?;
            Box::new(IoLogger::with_sink(overlaid, Box::new(sink), args.io_log_data)?)
        }
        None => overlaid,
    };

    Ok(logged)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let image = build_image(&args)?;
    let mut config = MassStorageConfig::new(args.mount.clone(), args.block_size);
    config.write_perms = args.write_perms.clone().into();

    let function = MassStorageFunction::new(config, image);
    let cancel = CancellationToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("received ctrl-c, shutting down");
            ctrl_c_cancel.cancel();
        }
    });

    evilstor::daemon::run(function, args.mount, cancel)
        .await
        .context("mass storage function loop exited with an error")
}
