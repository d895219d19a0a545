//! In-memory transport used by tests and dry runs.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::trace;

use super::Transport;
use crate::Result;

/// Queue-backed transport.
///
/// `recv` pops queued inbound frames and reports a timeout once the queue is
/// empty, so a finite script never blocks. Everything sent is recorded.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the engine to receive.
    pub fn push_inbound(&mut self, frame: impl Into<Vec<u8>>) {
        self.inbound.push_back(frame.into());
    }

    pub fn with_inbound<I, F>(frames: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Vec<u8>>,
    {
        let mut transport = Self::new();
        for frame in frames {
            transport.push_inbound(frame);
        }
        transport
    }

    /// Frames written so far, oldest first.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn pending(&self) -> usize {
        self.inbound.len()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        trace!("memory: sent {} bytes", frame.len());
        self.sent.push(frame.to_vec());
        Ok(())
    }

    async fn recv(&mut self, _timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        Ok(self.inbound.pop_front())
    }
}
