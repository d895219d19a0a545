//! Replay captured Bluetooth HCI traffic against a controller-side transport.
//!
//! A replay run loads one or more capture files into a [`Sequence`], derives
//! per-packet timing, applies an optional directive file and then drives the
//! sequence through a [`Transport`] with the [`ReplayEngine`]. Packets the
//! controller originally sent are written out; packets the host sent are
//! awaited and verified.
//!
//! # Features
//!
//! - **Capture formats**: btsnoop (UART, HCI and monitor datalinks), pktlog, hcidump
//! - **Directives**: per-position and per-type `action`/`delta` overrides
//! - **Pacing**: optional reproduction of recorded inter-packet gaps
//! - **Emulated peer**: answer forwarded commands in place of a real controller
//!
//! ## Example
//!
//! ```rust,no_run
//! use hcireplay::{
//!     CaptureFormat, NullEmulator, ReplayEngine, ReplayOptions, VhciTransport, prepare_sequence,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> hcireplay::Result<()> {
//!     let (seq, types) = prepare_sequence(&["boot.btsnoop"], CaptureFormat::Btsnoop, None)?;
//!     let transport = VhciTransport::open("/dev/vhci").await?;
//!
//!     let mut engine = ReplayEngine::new(seq, types, transport, NullEmulator, ReplayOptions::default());
//!     let summary = engine.run().await?;
//!     println!("Processed {} out of {}", summary.processed, summary.total);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Load and configuration phases
pub mod capture;
pub mod config;
pub mod sequence;

// Replay phase
pub mod decoder;
pub mod emulator;
pub mod replay;
pub mod transport;

// Core exports
pub use error::*;
pub use types::*;

pub use capture::{CaptureFormat, CaptureReader, load_capture, load_captures};
pub use config::{ConfigParser, TypeKey, TypeOverrideTable, parse_file};
pub use emulator::{Emulator, EmulatorKind, NullEmulator, ResponderEmulator};
pub use replay::{DelayMode, ReplayEngine, ReplayOptions, ReplaySummary, StepOutcome};
pub use sequence::{Sequence, SequenceNode, normalize_timing};
pub use transport::{MemoryTransport, Transport, VhciTransport};

/// Load captures, normalize timing and apply an optional directive file.
///
/// The returned sequence is ready to hand to [`ReplayEngine::new`].
///
/// # Errors
///
/// Returns an error if:
/// - A capture file cannot be opened or is malformed
/// - The directive file cannot be read or has an invalid line
pub fn prepare_sequence<P: AsRef<std::path::Path>>(
    captures: &[P],
    format: CaptureFormat,
    config: Option<&std::path::Path>,
) -> Result<(Sequence, TypeOverrideTable)> {
    let mut seq = Sequence::new();
    load_captures(captures, format, &mut seq)?;
    normalize_timing(&mut seq);

    let mut types = TypeOverrideTable::new();
    if let Some(path) = config {
        parse_file(path, &mut seq, &mut types)?;
    }
    Ok((seq, types))
}
