//! Normalized HCI packet representation shared by the capture parsers and the
//! replay engine.

use super::Timeval;

/// H4 packet indicator bytes (UART transport framing).
pub const H4_COMMAND: u8 = 0x01;
pub const H4_ACL_DATA: u8 = 0x02;
pub const H4_SCO_DATA: u8 = 0x03;
pub const H4_EVENT: u8 = 0x04;

/// Largest frame read from the transport in one go (ACL MTU plus headers).
pub const HCI_MAX_FRAME_SIZE: usize = 1028;

/// Packet kind, derived from the leading H4 byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Command,
    Event,
    AclData,
    ScoData,
    Unknown,
}

impl PacketKind {
    pub const fn from_h4(indicator: u8) -> Self {
        match indicator {
            H4_COMMAND => PacketKind::Command,
            H4_EVENT => PacketKind::Event,
            H4_ACL_DATA => PacketKind::AclData,
            H4_SCO_DATA => PacketKind::ScoData,
            _ => PacketKind::Unknown,
        }
    }

    pub const fn h4_indicator(self) -> Option<u8> {
        match self {
            PacketKind::Command => Some(H4_COMMAND),
            PacketKind::Event => Some(H4_EVENT),
            PacketKind::AclData => Some(H4_ACL_DATA),
            PacketKind::ScoData => Some(H4_SCO_DATA),
            PacketKind::Unknown => None,
        }
    }
}

/// Which side of the HCI sent the packet when it was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host to controller (commands, outgoing data).
    ToController,
    /// Controller to host (events, incoming data).
    FromController,
}

impl Direction {
    /// Map the capture formats' "received by host" flag.
    pub const fn from_received(received: bool) -> Self {
        if received { Direction::FromController } else { Direction::ToController }
    }

    pub const fn arrow(self) -> char {
        match self {
            Direction::ToController => '<',
            Direction::FromController => '>',
        }
    }
}

/// One captured HCI packet, H4 indicator byte included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: PacketKind,
    direction: Direction,
    data: Vec<u8>,
    timestamp: Timeval,
}

impl Frame {
    /// Wrap raw H4 bytes; the kind comes from the first byte.
    pub fn new(direction: Direction, data: Vec<u8>, timestamp: Timeval) -> Self {
        let kind = data.first().map_or(PacketKind::Unknown, |b| PacketKind::from_h4(*b));
        Self { kind, direction, data, timestamp }
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Routing may reinterpret who sent a frame (e.g. emulated peer output).
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn timestamp(&self) -> Timeval {
        self.timestamp
    }

    /// Raw bytes including the H4 indicator.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes after the H4 indicator.
    pub fn payload(&self) -> &[u8] {
        self.data.get(1..).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Little-endian command opcode, for command frames long enough to carry one.
    pub fn opcode(&self) -> Option<u16> {
        match (self.kind, self.data.get(1..3)) {
            (PacketKind::Command, Some(&[lo, hi])) => Some(u16::from_le_bytes([lo, hi])),
            _ => None,
        }
    }

    /// Event code, for event frames long enough to carry one.
    pub fn event_code(&self) -> Option<u8> {
        match self.kind {
            PacketKind::Event => self.data.get(1).copied(),
            _ => None,
        }
    }
}

pub const fn opcode_ogf(opcode: u16) -> u8 {
    (opcode >> 10) as u8
}

pub const fn opcode_ocf(opcode: u16) -> u16 {
    opcode & 0x03ff
}

pub const fn opcode_pack(ogf: u8, ocf: u16) -> u16 {
    (ocf & 0x03ff) | ((ogf as u16) << 10)
}
