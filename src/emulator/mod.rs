//! Emulated controller peers.
//!
//! The replay engine hands every frame routed to the emulated peer to
//! [`Emulator::feed`] and writes whatever comes back to the transport.

mod responder;

pub use responder::{DEFAULT_BD_ADDR, ResponderEmulator, parse_bd_addr};

use crate::Result;

/// A software controller that may answer frames routed to it.
pub trait Emulator: Send {
    /// Consume one raw H4 frame and return the frames produced in response.
    fn feed(&mut self, frame: &[u8]) -> Vec<Vec<u8>>;

    fn name(&self) -> &'static str;
}

impl<E: Emulator + ?Sized> Emulator for Box<E> {
    fn feed(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        (**self).feed(frame)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Peer that absorbs everything and never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEmulator;

impl Emulator for NullEmulator {
    fn feed(&mut self, _frame: &[u8]) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Emulated device selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EmulatorKind {
    #[default]
    None,
    /// Answers commands with Command Complete.
    Responder,
}

impl EmulatorKind {
    /// Build the selected peer. `bd_addr` is given in display order
    /// (`AA:BB:CC:DD:EE:FF`) and defaults to [`DEFAULT_BD_ADDR`].
    pub fn create(self, bd_addr: Option<&str>) -> Result<Box<dyn Emulator>> {
        Ok(match self {
            EmulatorKind::None => Box::new(NullEmulator),
            EmulatorKind::Responder => {
                let addr = bd_addr.map(parse_bd_addr).transpose()?.unwrap_or(DEFAULT_BD_ADDR);
                Box::new(ResponderEmulator::new(addr))
            }
        })
    }
}
