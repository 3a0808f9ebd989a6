//! # bioscan
//!
//! Command-line driver for fingerprint and iris capture devices.
//!
//! ```bash
//! # Query device information from the built-in simulated scanner
//! bioscan info
//!
//! # Capture a four-finger slap into slot 2 over TCP and fetch the WSQ image
//! bioscan --tcp 192.168.1.40:7000 capture four --slot 2 --wsq
//! ```
//!
//! Log output is controlled with `RUST_LOG`.

use anyhow::Result;
use bioscan_core::{CaptureKind, SlotIndex};
use bioscan_device::mock::MockScanner;
use bioscan_device::{AnyTransport, DeviceClient, LinkTransport};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod runner;

use config::Overrides;
use runner::{Runner, describe};

/// bioscan - capture device command-line tool
#[derive(Parser, Debug)]
#[command(name = "bioscan")]
#[command(about = "Command-line driver for fingerprint and iris capture devices", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON client configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Device endpoint; the simulated scanner is used when omitted
    #[arg(long, global = true)]
    tcp: Option<SocketAddr>,

    /// Connect timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Client label used in log output
    #[arg(long, global = true)]
    label: Option<String>,

    /// Seconds to wait for each device reply
    #[arg(long, global = true, default_value_t = 30)]
    reply_timeout: u64,

    /// Preview frames the simulated scanner sends per capture
    #[arg(long, global = true, default_value_t = 2)]
    frames: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query battery, identity and reader description
    Info,

    /// Run one capture
    Capture {
        #[arg(value_enum)]
        kind: KindArg,

        /// Slot the fingerprint image is saved to
        #[arg(short, long, default_value_t = 0)]
        slot: u32,

        /// Also fetch the WSQ-compressed image
        #[arg(long)]
        wsq: bool,
    },

    /// Print the library version
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    One,
    Two,
    Four,
    Roll,
    Iris,
}

impl From<KindArg> for CaptureKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::One => CaptureKind::OneFinger,
            KindArg::Two => CaptureKind::TwoFinger,
            KindArg::Four => CaptureKind::FourFinger,
            KindArg::Roll => CaptureKind::RolledFinger,
            KindArg::Iris => CaptureKind::Iris,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bioscan=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("bioscan {}", DeviceClient::library_version());
        return Ok(());
    }

    let overrides = Overrides {
        connect_timeout_ms: cli.timeout_ms,
        label: cli.label.clone(),
    };
    let config = config::load(cli.config.as_deref(), &overrides)?;

    let transport = match cli.tcp {
        Some(addr) => AnyTransport::from(LinkTransport::tcp(addr)),
        None => {
            let (scanner, handle) = MockScanner::new();
            handle.set_preview_frames(cli.frames);
            AnyTransport::from(scanner)
        }
    };

    let client = DeviceClient::new(transport, config);
    let mut runner = Runner::new(client, Duration::from_secs(cli.reply_timeout))?;
    runner.connect().await?;

    let result = match cli.command {
        Commands::Info => info(&mut runner).await,
        Commands::Capture { kind, slot, wsq } => {
            capture(&mut runner, kind.into(), SlotIndex::new(slot), wsq).await
        }
        Commands::Version => Ok(()),
    };

    runner.finish().await?;
    result
}

async fn info(runner: &mut Runner) -> Result<()> {
    for reply in runner.info().await? {
        println!("{}", describe(&reply.into()));
    }
    Ok(())
}

async fn capture(runner: &mut Runner, kind: CaptureKind, slot: SlotIndex, wsq: bool) -> Result<()> {
    let outcome = runner.capture(kind, slot, wsq).await?;

    println!("capture: {:?}", outcome.kind);
    println!("frames: {}", outcome.frames);
    if let Some(saved_at) = outcome.saved_at {
        println!(
            "image: {}x{} saved at slot {saved_at}",
            outcome.width, outcome.height
        );
    }
    if let Some(score) = outcome.nfiq {
        println!("nfiq: {score}");
    }
    if let Some(len) = outcome.wsq_bytes {
        println!("wsq: {len} bytes");
    }
    Ok(())
}
