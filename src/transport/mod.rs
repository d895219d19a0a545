//! Transport trait for the controller-side byte channel

pub mod memory;
pub mod vhci;

pub use memory::MemoryTransport;
pub use vhci::{DEFAULT_VHCI_PATH, VhciTransport};

use std::time::Duration;

use crate::Result;

/// Duplex channel carrying raw H4 frames to and from the host stack.
///
/// Transports abstract over the virtual HCI device and in-memory test
/// doubles. Each call moves exactly one complete frame.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Write one complete frame, H4 indicator included.
    async fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Wait for the next inbound frame.
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - A frame arrived
    /// - `Ok(None)` - `timeout` elapsed with nothing received
    /// - `Err(e)` - The channel failed or was closed
    ///
    /// A `timeout` of `None` waits indefinitely.
    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>>;
}
