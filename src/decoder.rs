//! One-line packet rendering for the replay log.

use std::fmt;

use tracing::info;

use crate::types::{Frame, PacketKind, opcode_ocf, opcode_ogf};

/// Where a logged frame sits relative to the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPrefix {
    /// 1-based position and sequence length.
    Position { pos: usize, len: usize },
    /// Received frame that did not match the expected one.
    Unknown,
    /// Produced by the emulated peer.
    Emulated,
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogPrefix::Position { pos, len } => write!(f, "[{:4}/{:4}]", pos, len),
            LogPrefix::Unknown => f.write_str("[ Unknown ]"),
            LogPrefix::Emulated => f.write_str("[ Emulated ]"),
        }
    }
}

/// Render `frame` as `<timestamp> <arrow> <kind>: <details>`.
pub fn describe(frame: &Frame) -> String {
    let data = frame.data();
    let details = match frame.kind() {
        PacketKind::Command => match (frame.opcode(), data.get(3)) {
            (Some(opcode), Some(plen)) => format!(
                "HCI Command: {} (0x{:02x}|0x{:04x}) plen {}",
                command_name(opcode),
                opcode_ogf(opcode),
                opcode_ocf(opcode),
                plen
            ),
            _ => "HCI Command: truncated".to_string(),
        },
        PacketKind::Event => match (frame.event_code(), data.get(2)) {
            (Some(code), Some(plen)) => {
                format!("HCI Event: {} (0x{:02x}) plen {}", event_name(code), code, plen)
            }
            _ => "HCI Event: truncated".to_string(),
        },
        PacketKind::AclData => match data.get(1..5) {
            Some(h) => {
                let handle = u16::from_le_bytes([h[0], h[1]]);
                let dlen = u16::from_le_bytes([h[2], h[3]]);
                format!("ACL data: handle {} flags 0x{:02x} dlen {}", handle & 0x0fff, handle >> 12, dlen)
            }
            None => "ACL data: truncated".to_string(),
        },
        PacketKind::ScoData => match data.get(1..4) {
            Some(h) => format!(
                "SCO data: handle {} dlen {}",
                u16::from_le_bytes([h[0], h[1]]) & 0x0fff,
                h[2]
            ),
            None => "SCO data: truncated".to_string(),
        },
        PacketKind::Unknown => match data.first() {
            Some(indicator) => format!("Unknown packet type 0x{:02x} len {}", indicator, data.len()),
            None => "Empty packet".to_string(),
        },
    };

    format!("{} {} {}", frame.timestamp(), frame.direction().arrow(), details)
}

/// Emit the rendering of `frame` on the verdict stream.
pub fn log_frame(prefix: LogPrefix, frame: &Frame) {
    info!("{} {}", prefix, describe(frame));
}

fn command_name(opcode: u16) -> &'static str {
    match opcode {
        0x0401 => "Inquiry",
        0x0402 => "Inquiry Cancel",
        0x0405 => "Create Connection",
        0x0406 => "Disconnect",
        0x0408 => "Create Connection Cancel",
        0x0409 => "Accept Connection Request",
        0x040b => "Link Key Request Reply",
        0x0419 => "Remote Name Request",
        0x0c01 => "Set Event Mask",
        0x0c03 => "Reset",
        0x0c05 => "Set Event Filter",
        0x0c13 => "Write Local Name",
        0x0c14 => "Read Local Name",
        0x0c1a => "Write Scan Enable",
        0x0c23 => "Read Class of Device",
        0x0c24 => "Write Class of Device",
        0x0c56 => "Write Simple Pairing Mode",
        0x0c6d => "Write LE Host Supported",
        0x1001 => "Read Local Version Information",
        0x1002 => "Read Local Supported Commands",
        0x1003 => "Read Local Supported Features",
        0x1004 => "Read Local Extended Features",
        0x1005 => "Read Buffer Size",
        0x1009 => "Read BD ADDR",
        0x2001 => "LE Set Event Mask",
        0x2002 => "LE Read Buffer Size",
        0x200b => "LE Set Scan Parameters",
        0x200c => "LE Set Scan Enable",
        0x200d => "LE Create Connection",
        _ => "Unknown",
    }
}

fn event_name(code: u8) -> &'static str {
    match code {
        0x01 => "Inquiry Complete",
        0x02 => "Inquiry Result",
        0x03 => "Connect Complete",
        0x04 => "Connect Request",
        0x05 => "Disconnect Complete",
        0x07 => "Remote Name Req Complete",
        0x08 => "Encrypt Change",
        0x0e => "Command Complete",
        0x0f => "Command Status",
        0x10 => "Hardware Error",
        0x13 => "Number of Completed Packets",
        0x3e => "LE Meta Event",
        0xff => "Vendor",
        _ => "Unknown",
    }
}
