//! Test utilities for building synthetic captures
//!
//! Captures are generated in memory so unit tests and benchmarks do not depend
//! on fixture files.

#![cfg(any(test, feature = "benchmark"))]

use crate::capture::format::{BTSNOOP_MAGIC, BTSNOOP_VERSION, timeval_to_btsnoop};
use crate::types::{Direction, Frame, H4_COMMAND, H4_EVENT, Timeval};

/// Builder for btsnoop byte streams.
#[derive(Debug, Clone)]
pub struct BtsnoopBuilder {
    bytes: Vec<u8>,
}

impl BtsnoopBuilder {
    /// Start a capture with the given datalink type.
    pub fn new(datalink: u32) -> Self {
        let mut bytes = BTSNOOP_MAGIC.to_vec();
        bytes.extend_from_slice(&BTSNOOP_VERSION.to_be_bytes());
        bytes.extend_from_slice(&datalink.to_be_bytes());
        Self { bytes }
    }

    /// Start an H4 (datalink 1002) capture.
    pub fn uart() -> Self {
        Self::new(1002)
    }

    /// Append an H4-framed packet, deriving the flags from the indicator byte.
    pub fn record(self, data: &[u8], received: bool, ts: Timeval) -> Self {
        let mut flags = u32::from(received);
        if matches!(data.first(), Some(&H4_COMMAND) | Some(&H4_EVENT)) {
            flags |= 0x02;
        }
        self.raw_record(data, flags, ts)
    }

    /// Append a record with explicit flags.
    pub fn raw_record(mut self, data: &[u8], flags: u32, ts: Timeval) -> Self {
        let len = data.len() as u32;
        self.bytes.extend_from_slice(&len.to_be_bytes());
        self.bytes.extend_from_slice(&len.to_be_bytes());
        self.bytes.extend_from_slice(&flags.to_be_bytes());
        self.bytes.extend_from_slice(&0u32.to_be_bytes());
        self.bytes.extend_from_slice(&timeval_to_btsnoop(ts).to_be_bytes());
        self.bytes.extend_from_slice(data);
        self
    }

    /// Append a frame as captured.
    pub fn frame(self, frame: &Frame) -> Self {
        let received = frame.direction() == Direction::FromController;
        self.record(frame.data(), received, frame.timestamp())
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// One pktlog record: `payload` excludes the synthesized indicator byte.
pub fn pktlog_record(packet_type: u8, payload: &[u8], sec: u32, usec: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(payload.len() as u32 + 9).to_be_bytes());
    bytes.extend_from_slice(&((u64::from(sec) << 32) | u64::from(usec)).to_be_bytes());
    bytes.push(packet_type);
    bytes.extend_from_slice(payload);
    bytes
}

/// One hcidump record: `data` starts with the H4 indicator.
pub fn hcidump_record(data: &[u8], received: bool, sec: u32, usec: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
    bytes.push(u8::from(received));
    bytes.push(0);
    bytes.extend_from_slice(&sec.to_le_bytes());
    bytes.extend_from_slice(&usec.to_le_bytes());
    bytes.extend_from_slice(data);
    bytes
}

/// A Command frame for `opcode` with no parameters.
pub fn command(opcode: u16, ts: Timeval) -> Frame {
    let [lo, hi] = opcode.to_le_bytes();
    Frame::new(Direction::ToController, vec![H4_COMMAND, lo, hi, 0x00], ts)
}

/// An Event frame with the given code and parameters.
pub fn event(code: u8, params: &[u8], ts: Timeval) -> Frame {
    let mut data = vec![H4_EVENT, code, params.len() as u8];
    data.extend_from_slice(params);
    Frame::new(Direction::FromController, data, ts)
}

/// An ACL frame for `handle` carrying `payload`.
pub fn acl(handle: u16, payload: &[u8], direction: Direction, ts: Timeval) -> Frame {
    let [lo, hi] = (handle & 0x0fff).to_le_bytes();
    let [len_lo, len_hi] = (payload.len() as u16).to_le_bytes();
    let mut data = vec![crate::types::H4_ACL_DATA, lo, hi, len_lo, len_hi];
    data.extend_from_slice(payload);
    Frame::new(direction, data, ts)
}

/// A capture of `count` alternating Event/Command/ACL frames spaced 1ms apart.
pub fn synthetic_capture(count: usize) -> Vec<u8> {
    (0..count)
        .fold(BtsnoopBuilder::uart(), |builder, i| {
            let ts = Timeval::new(1_700_000_000, 0) + Timeval::from_micros(i as i64 * 1000);
            let frame = match i % 3 {
                0 => event(0x0e, &[0x01, 0x03, 0x0c, 0x00], ts),
                1 => command(0x0c03, ts),
                _ => acl(0x0001, &[0u8; 27], Direction::FromController, ts),
            };
            builder.frame(&frame)
        })
        .build()
}
