use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hcireplay::transport::DEFAULT_VHCI_PATH;
use hcireplay::{
    CaptureFormat, DelayMode, Emulator, EmulatorKind, ReplayEngine, ReplayError, ReplayOptions,
    VhciTransport, prepare_sequence,
};

#[derive(Parser, Debug)]
#[command(name = "hcireplay")]
#[command(version)]
#[command(about = "Replay Bluetooth HCI captures on a virtual controller", long_about = None)]
struct Args {
    /// Capture files, replayed in order as one sequence
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Log scope resolution and pacing detail
    #[arg(short, long)]
    verbose: bool,

    /// Directive file applied before replay
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Capture file format
    #[arg(short, long, value_enum, default_value_t = CaptureFormat::Btsnoop)]
    format: CaptureFormat,

    /// Reproduce recorded inter-packet gaps
    #[arg(short, long, value_enum, default_value_t = DelayMode::None)]
    delay: DelayMode,

    /// Multiplier applied to recorded gaps
    #[arg(short = 'm', long, value_name = "FACTOR", default_value_t = 1.0, value_parser = parse_factor)]
    delay_modifier: f64,

    /// Give up on an expected packet after this many milliseconds
    #[arg(short, long, value_name = "MS")]
    timeout: Option<u64>,

    /// Emulated peer answering forwarded packets
    #[arg(short, long, value_enum, default_value_t = EmulatorKind::None)]
    emulator: EmulatorKind,

    /// Address reported by the responder emulator (AA:BB:CC:DD:EE:FF)
    #[arg(long, value_name = "ADDR")]
    bd_addr: Option<String>,

    /// Virtual HCI device
    #[arg(long, value_name = "PATH", default_value = DEFAULT_VHCI_PATH)]
    device: PathBuf,
}

fn parse_factor(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f > 0.0 => Ok(f),
        Ok(_) => Err("delay modifier must be greater than 0".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let (seq, types) = prepare_sequence(args.files.as_slice(), args.format, args.config.as_deref())
        .context("failed to prepare replay sequence")?;

    let options = ReplayOptions {
        delay: args.delay,
        delay_factor: args.delay_modifier,
        timeout: args.timeout.map(Duration::from_millis),
    };
    let emulator = args.emulator.create(args.bd_addr.as_deref()).context("failed to create emulated peer")?;
    let transport = VhciTransport::open(&args.device)
        .await
        .with_context(|| format!("failed to open {}", args.device.display()))?;

    info!("Emulated peer: {}", emulator.name());
    let mut engine = ReplayEngine::new(seq, types, transport, emulator, options);
    engine.run().await.context("replay aborted")?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG overrides the verbosity flag
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hcireplay: {:#}", e);
            if let Some(replay) = e.downcast_ref::<ReplayError>() {
                if replay.is_retryable() {
                    eprintln!("  this failure may be transient; running again can succeed");
                }
                for hint in replay.recovery_suggestions() {
                    eprintln!("  hint: {}", hint);
                }
            }
            ExitCode::FAILURE
        }
    }
}
