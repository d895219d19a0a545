//! Minimal controller that acknowledges every command.

use tracing::{debug, warn};

use super::Emulator;
use crate::types::{H4_COMMAND, H4_EVENT};
use crate::{ReplayError, Result};

const EVT_COMMAND_COMPLETE: u8 = 0x0e;

const OP_READ_LOCAL_VERSION: u16 = 0x1001;
const OP_READ_BUFFER_SIZE: u16 = 0x1005;
const OP_READ_BD_ADDR: u16 = 0x1009;

/// Address reported by Read BD_ADDR unless configured, in display order.
pub const DEFAULT_BD_ADDR: [u8; 6] = [0x00, 0xaa, 0x01, 0x00, 0x00, 0x23];

/// Answers each HCI command with a successful Command Complete.
///
/// Read Local Version, Read Buffer Size and Read BD_ADDR get plausible return
/// parameters; everything else gets the status byte alone. Non-command
/// frames are absorbed.
#[derive(Debug, Clone)]
pub struct ResponderEmulator {
    bd_addr: [u8; 6],
    answered: usize,
}

impl ResponderEmulator {
    pub fn new(bd_addr: [u8; 6]) -> Self {
        Self { bd_addr, answered: 0 }
    }

    /// Number of commands answered so far.
    pub fn answered(&self) -> usize {
        self.answered
    }

    fn return_parameters(&self, opcode: u16) -> Vec<u8> {
        match opcode {
            OP_READ_LOCAL_VERSION => {
                // status, HCI 5.0 rev 0, LMP 5.0, manufacturer 0x003f, subversion 0
                vec![0x00, 0x09, 0x00, 0x00, 0x09, 0x3f, 0x00, 0x00, 0x00]
            }
            OP_READ_BUFFER_SIZE => {
                let mut params = vec![0x00];
                params.extend_from_slice(&1021u16.to_le_bytes());
                params.push(96);
                params.extend_from_slice(&4u16.to_le_bytes());
                params.extend_from_slice(&6u16.to_le_bytes());
                params
            }
            OP_READ_BD_ADDR => {
                let mut params = vec![0x00];
                params.extend(self.bd_addr.iter().rev());
                params
            }
            _ => vec![0x00],
        }
    }
}

impl Default for ResponderEmulator {
    fn default() -> Self {
        Self::new(DEFAULT_BD_ADDR)
    }
}

impl Emulator for ResponderEmulator {
    fn feed(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        let Some((&H4_COMMAND, body)) = frame.split_first() else {
            debug!("responder: ignoring non-command frame");
            return Vec::new();
        };

        if body.len() < 3 || usize::from(body[2]) != body.len() - 3 {
            warn!("responder: invalid command length {}", body.len());
            return Vec::new();
        }

        let opcode = u16::from_le_bytes([body[0], body[1]]);
        debug!("responder: command complete for 0x{:04x}", opcode);
        self.answered += 1;
        vec![command_complete(opcode, &self.return_parameters(opcode))]
    }

    fn name(&self) -> &'static str {
        "responder"
    }
}

/// Build an H4 Command Complete event with one command credit.
fn command_complete(opcode: u16, params: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x01];
    payload.extend_from_slice(&opcode.to_le_bytes());
    payload.extend_from_slice(params);

    let mut frame = vec![H4_EVENT, EVT_COMMAND_COMPLETE, payload.len() as u8];
    frame.extend(payload);
    frame
}

/// Parse `AA:BB:CC:DD:EE:FF`.
pub fn parse_bd_addr(text: &str) -> Result<[u8; 6]> {
    let invalid = || ReplayError::Emulator { reason: format!("invalid BD_ADDR '{}'", text) };

    let mut addr = [0u8; 6];
    let mut parts = text.split(':');
    for byte in addr.iter_mut() {
        let part = parts.next().filter(|p| p.len() == 2).ok_or_else(invalid)?;
        *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(addr)
}
