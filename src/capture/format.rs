//! Capture file format structures and parsing
//!
//! Binary layouts of the three supported capture formats and the helpers to
//! decode them from a byte stream.
//!
//! ## btsnoop
//!
//! 1. **File Header** (16 bytes) - `"btsnoop\0"`, version (=1), datalink type
//! 2. **Records** - 24-byte record header followed by `included_len` bytes
//!
//! All btsnoop integers are big-endian. The record timestamp counts
//! microseconds since midnight, January 1st, 0 AD.
//!
//! ## pktlog
//!
//! Headerless stream of `{ len: u32 BE, ts: u64 BE, type: u8 }` records, where
//! `len` covers the timestamp, the type byte and the payload.
//!
//! ## hcidump
//!
//! Headerless stream of `{ len: u16, in: u8, pad: u8, sec: u32, usec: u32 }`
//! records in little-endian (Bluetooth) byte order, followed by the
//! H4-framed payload.

use std::io::{self, Read};
use tracing::{debug, trace};

use crate::types::{Direction, H4_ACL_DATA, H4_COMMAND, H4_EVENT, H4_SCO_DATA, Timeval, USEC_PER_SEC};
use crate::{ReplayError, Result};

pub const BTSNOOP_MAGIC: [u8; 8] = *b"btsnoop\0";
pub const BTSNOOP_VERSION: u32 = 1;
pub const BTSNOOP_HEADER_SIZE: usize = 16;
pub const BTSNOOP_RECORD_HEADER_SIZE: usize = 24;

/// Microseconds between 0 AD and 2000-01-01 in the btsnoop calendar.
pub const BTSNOOP_EPOCH_DELTA: u64 = 0x00E0_3AB4_4A67_6000;
/// Seconds between the Unix epoch and 2000-01-01.
pub const Y2K_UNIX_SECS: i64 = 946_684_800;

pub const PKTLOG_HEADER_SIZE: usize = 13;
pub const HCIDUMP_HEADER_SIZE: usize = 12;

/// Upper bound on a single record: maximum ACL payload, ACL header and H4 byte.
pub const MAX_RECORD_LEN: usize = 65_540;

/// btsnoop datalink type from the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datalink {
    /// 1001: un-encapsulated HCI, packet type carried in the record flags.
    Hci,
    /// 1002: HCI UART (H4), payload already starts with the indicator byte.
    Uart,
    /// 2001: Linux monitor, packet type carried in the low 16 flag bits.
    Monitor,
    Other(u32),
}

impl Datalink {
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1001 => Datalink::Hci,
            1002 => Datalink::Uart,
            2001 => Datalink::Monitor,
            other => Datalink::Other(other),
        }
    }
}

/// btsnoop file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtsnoopHeader {
    pub version: u32,
    pub datalink: Datalink,
}

impl BtsnoopHeader {
    pub const HEADER_SIZE: usize = BTSNOOP_HEADER_SIZE;

    pub fn parse_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        trace!("Reading btsnoop header ({} bytes)", BTSNOOP_HEADER_SIZE);
        let mut data = [0u8; BTSNOOP_HEADER_SIZE];
        let n = read_n(reader, &mut data)?;
        if n != BTSNOOP_HEADER_SIZE {
            return Err(ReplayError::malformed(
                "btsnoop header",
                format!("expected {} header bytes, got {}", BTSNOOP_HEADER_SIZE, n),
            ));
        }

        if data[..8] != BTSNOOP_MAGIC {
            return Err(ReplayError::malformed(
                "btsnoop header",
                "identification pattern is not \"btsnoop\\0\"",
            ));
        }

        let version = parse_u32_be(&data, 8)?;
        let datalink = Datalink::from_raw(parse_u32_be(&data, 12)?);
        debug!("Parsed btsnoop header: version={}, datalink={:?}", version, datalink);

        Ok(Self { version, datalink })
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != BTSNOOP_VERSION {
            return Err(ReplayError::UnsupportedCapture {
                details: format!(
                    "btsnoop version {} (expected {})",
                    self.version, BTSNOOP_VERSION
                ),
            });
        }
        Ok(())
    }
}

/// btsnoop per-record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtsnoopRecordHeader {
    pub original_len: u32,
    pub included_len: u32,
    pub flags: u32,
    pub drops: u32,
    pub timestamp: u64,
}

impl BtsnoopRecordHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Self {
            original_len: parse_u32_be(data, 0)?,
            included_len: parse_u32_be(data, 4)?,
            flags: parse_u32_be(data, 8)?,
            drops: parse_u32_be(data, 12)?,
            timestamp: parse_u64_be(data, 16)?,
        })
    }

    /// Bit 0: 0 = sent by the host, 1 = received by the host.
    pub const fn direction(&self) -> Direction {
        Direction::from_received(self.flags & 0x01 != 0)
    }

    /// For datalink 1001, bit 1 separates command/event from data.
    pub const fn hci_indicator(&self) -> u8 {
        if self.flags & 0x02 != 0 {
            if self.flags & 0x01 != 0 { H4_EVENT } else { H4_COMMAND }
        } else {
            H4_ACL_DATA
        }
    }

    /// For datalink 2001, the low 16 bits are the monitor opcode.
    pub const fn monitor_opcode(&self) -> u16 {
        (self.flags & 0xffff) as u16
    }
}

/// Map a monitor opcode to the H4 indicator and direction it encodes.
///
/// Opcodes outside 2..=7 (index add/remove, system notes, ...) carry no HCI
/// traffic.
pub const fn monitor_indicator(opcode: u16) -> Option<(u8, Direction)> {
    match opcode {
        2 => Some((H4_COMMAND, Direction::ToController)),
        3 => Some((H4_EVENT, Direction::FromController)),
        4 => Some((H4_ACL_DATA, Direction::ToController)),
        5 => Some((H4_ACL_DATA, Direction::FromController)),
        6 => Some((H4_SCO_DATA, Direction::ToController)),
        7 => Some((H4_SCO_DATA, Direction::FromController)),
        _ => None,
    }
}

/// Convert a btsnoop record timestamp to Unix seconds and microseconds.
pub fn btsnoop_to_timeval(ts: u64) -> Timeval {
    let since_y2k = ts.wrapping_sub(BTSNOOP_EPOCH_DELTA) as i64;
    Timeval::new(since_y2k.div_euclid(USEC_PER_SEC) + Y2K_UNIX_SECS, since_y2k.rem_euclid(USEC_PER_SEC))
}

/// Inverse of [`btsnoop_to_timeval`].
pub fn timeval_to_btsnoop(tv: Timeval) -> u64 {
    // i128: the seconds part alone can undershoot i64 for timestamps near 0 AD
    let since_y2k =
        i128::from(tv.sec() - Y2K_UNIX_SECS) * i128::from(USEC_PER_SEC) + i128::from(tv.usec());
    (since_y2k as u64).wrapping_add(BTSNOOP_EPOCH_DELTA)
}

/// pktlog per-record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PktlogRecordHeader {
    pub len: u32,
    pub timestamp: u64,
    pub packet_type: u8,
}

impl PktlogRecordHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Self {
            len: parse_u32_be(data, 0)?,
            timestamp: parse_u64_be(data, 4)?,
            packet_type: *data.get(12).ok_or_else(|| insufficient("pktlog type", 12, 1, data))?,
        })
    }

    /// Indicator byte and direction for the record type, if recognized.
    pub const fn indicator(&self) -> Option<(u8, Direction)> {
        match self.packet_type {
            0x00 => Some((H4_COMMAND, Direction::ToController)),
            0x01 => Some((H4_EVENT, Direction::FromController)),
            0x02 => Some((H4_ACL_DATA, Direction::ToController)),
            0x03 => Some((H4_ACL_DATA, Direction::FromController)),
            _ => None,
        }
    }

    /// Payload bytes following the header (`len` minus timestamp and type).
    pub fn payload_len(&self) -> Result<usize> {
        (self.len as usize).checked_sub(9).ok_or_else(|| {
            ReplayError::malformed("pktlog record", format!("record length {} below minimum 9", self.len))
        })
    }

    /// High 32 bits are seconds, low 32 bits microseconds. No epoch correction.
    pub fn timeval(&self) -> Timeval {
        Timeval::new((self.timestamp >> 32) as i64, (self.timestamp & 0xffff_ffff) as i64)
    }
}

/// hcidump per-record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HcidumpRecordHeader {
    pub len: u16,
    pub received: u8,
    pub ts_sec: u32,
    pub ts_usec: u32,
}

impl HcidumpRecordHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Self {
            len: parse_u16_le(data, 0)?,
            received: *data.get(2).ok_or_else(|| insufficient("hcidump direction", 2, 1, data))?,
            ts_sec: parse_u32_le(data, 4)?,
            ts_usec: parse_u32_le(data, 8)?,
        })
    }

    pub const fn direction(&self) -> Direction {
        Direction::from_received(self.received != 0)
    }

    pub fn timeval(&self) -> Timeval {
        Timeval::new(i64::from(self.ts_sec), i64::from(self.ts_usec))
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
///
/// Returns the number of bytes read: `0` means the stream was already
/// exhausted, anything short of `buf.len()` means it ended mid-way.
pub fn read_n<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

/// Read exactly `len` bytes of record payload or fail as truncated.
pub fn read_payload<R: Read>(reader: &mut R, buf: &mut [u8], context: &str) -> Result<()> {
    let n = read_n(reader, buf)?;
    if n != buf.len() {
        return Err(ReplayError::malformed(
            context,
            format!("record declares {} bytes but only {} remain", buf.len(), n),
        ));
    }
    Ok(())
}

/// Discard `len` bytes (forward seek over an unrecognized record).
pub fn skip_n<R: Read>(reader: &mut R, len: usize, context: &str) -> Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(len as u64), &mut io::sink())?;
    if skipped != len as u64 {
        return Err(ReplayError::malformed(
            context,
            format!("cannot skip {} bytes, only {} remain", len, skipped),
        ));
    }
    Ok(())
}

/// Reject record lengths no HCI packet can have.
pub fn check_record_len(len: usize, context: &str) -> Result<()> {
    if len > MAX_RECORD_LEN {
        return Err(ReplayError::malformed(
            context,
            format!("record length {} exceeds maximum {}", len, MAX_RECORD_LEN),
        ));
    }
    Ok(())
}

fn insufficient(what: &str, offset: usize, need: usize, data: &[u8]) -> ReplayError {
    ReplayError::malformed(
        what,
        format!(
            "insufficient data at offset {} (need {} bytes, have {})",
            offset,
            need,
            data.len().saturating_sub(offset)
        ),
    )
}

fn field<const N: usize>(data: &[u8], offset: usize, what: &str) -> Result<[u8; N]> {
    data.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| insufficient(what, offset, N, data))
}

fn parse_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    field::<2>(data, offset, "u16 field").map(u16::from_le_bytes)
}

fn parse_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    field::<4>(data, offset, "u32 field").map(u32::from_le_bytes)
}

fn parse_u32_be(data: &[u8], offset: usize) -> Result<u32> {
    field::<4>(data, offset, "u32 field").map(u32::from_be_bytes)
}

fn parse_u64_be(data: &[u8], offset: usize) -> Result<u64> {
    field::<8>(data, offset, "u64 field").map(u64::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn header_bytes(version: u32, datalink: u32) -> Vec<u8> {
        let mut data = BTSNOOP_MAGIC.to_vec();
        data.extend_from_slice(&version.to_be_bytes());
        data.extend_from_slice(&datalink.to_be_bytes());
        data
    }

    #[test]
    fn test_header_parsing() -> Result<()> {
        let header = BtsnoopHeader::parse_from_reader(&mut Cursor::new(header_bytes(1, 1002)))?;
        assert_eq!(header, BtsnoopHeader { version: 1, datalink: Datalink::Uart });
        header.validate()
    }

    #[test]
    fn test_bad_magic() {
        let mut data = header_bytes(1, 1002);
        data[0] = b'B';
        let result = BtsnoopHeader::parse_from_reader(&mut Cursor::new(data));
        assert!(matches!(result, Err(ReplayError::MalformedCapture { .. })));
    }

    #[test]
    fn test_truncated_header() {
        let result = BtsnoopHeader::parse_from_reader(&mut Cursor::new(vec![0x62u8; 10]));
        assert!(matches!(result, Err(ReplayError::MalformedCapture { .. })));
    }

    #[test]
    fn test_invalid_version() -> Result<()> {
        let header = BtsnoopHeader::parse_from_reader(&mut Cursor::new(header_bytes(2, 1001)))?;
        assert!(matches!(header.validate(), Err(ReplayError::UnsupportedCapture { .. })));
        Ok(())
    }

    #[test]
    fn test_record_flags() -> Result<()> {
        let mut raw = [0u8; BTSNOOP_RECORD_HEADER_SIZE];
        raw[4..8].copy_from_slice(&3u32.to_be_bytes());
        for (flags, indicator, direction) in [
            (0u32, H4_ACL_DATA, Direction::ToController),
            (1, H4_ACL_DATA, Direction::FromController),
            (2, H4_COMMAND, Direction::ToController),
            (3, H4_EVENT, Direction::FromController),
        ] {
            raw[8..12].copy_from_slice(&flags.to_be_bytes());
            let header = BtsnoopRecordHeader::parse(&raw)?;
            assert_eq!(header.included_len, 3);
            assert_eq!(header.hci_indicator(), indicator);
            assert_eq!(header.direction(), direction);
        }
        Ok(())
    }

    #[test]
    fn test_known_timestamp() {
        // 2000-01-01T00:00:00.000001Z
        let tv = btsnoop_to_timeval(BTSNOOP_EPOCH_DELTA + 1);
        assert_eq!((tv.sec(), tv.usec()), (Y2K_UNIX_SECS, 1));
    }

    #[test]
    fn test_pktlog_header() -> Result<()> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&12u32.to_be_bytes());
        raw.extend_from_slice(&((7u64 << 32) | 250).to_be_bytes());
        raw.push(0x03);
        let header = PktlogRecordHeader::parse(&raw)?;
        assert_eq!(header.payload_len()?, 3);
        assert_eq!(header.indicator(), Some((H4_ACL_DATA, Direction::FromController)));
        assert_eq!(header.timeval(), Timeval::new(7, 250));

        raw[0..4].copy_from_slice(&4u32.to_be_bytes());
        assert!(PktlogRecordHeader::parse(&raw)?.payload_len().is_err());
        Ok(())
    }

    #[test]
    fn test_hcidump_header() -> Result<()> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&4u16.to_le_bytes());
        raw.push(1);
        raw.push(0);
        raw.extend_from_slice(&100u32.to_le_bytes());
        raw.extend_from_slice(&42u32.to_le_bytes());
        let header = HcidumpRecordHeader::parse(&raw)?;
        assert_eq!(header.len, 4);
        assert_eq!(header.direction(), Direction::FromController);
        assert_eq!(header.timeval(), Timeval::new(100, 42));
        assert!(HcidumpRecordHeader::parse(&raw[..6]).is_err());
        Ok(())
    }

    #[test]
    fn test_skip_and_payload_truncation() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        assert!(skip_n(&mut cursor, 2, "test").is_ok());
        let mut buf = [0u8; 4];
        assert!(matches!(
            read_payload(&mut cursor, &mut buf, "test"),
            Err(ReplayError::MalformedCapture { .. })
        ));
        assert!(check_record_len(MAX_RECORD_LEN + 1, "test").is_err());
    }

    #[test]
    fn test_monitor_opcodes() {
        assert_eq!(monitor_indicator(2), Some((H4_COMMAND, Direction::ToController)));
        assert_eq!(monitor_indicator(7), Some((H4_SCO_DATA, Direction::FromController)));
        assert_eq!(monitor_indicator(0), None);
        assert_eq!(monitor_indicator(12), None);
    }

    proptest! {
        #[test]
        fn btsnoop_timestamps_round_trip(ts in any::<u64>()) {
            let tv = btsnoop_to_timeval(ts);
            prop_assert!((0..USEC_PER_SEC).contains(&tv.usec()));
            prop_assert_eq!(timeval_to_btsnoop(tv), ts);
        }
    }
}
