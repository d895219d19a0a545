//! Capture file reader
//!
//! Decodes one record at a time from a byte stream into a [`Frame`], and loads
//! whole capture files into a [`Sequence`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use hcireplay::capture::{CaptureFormat, CaptureReader};
//!
//! fn count_frames() -> hcireplay::Result<()> {
//!     let mut reader = CaptureReader::open("hci.btsnoop", CaptureFormat::Btsnoop)?;
//!     let mut frames = 0;
//!     while let Some(frame) = reader.next_frame()? {
//!         println!("{:?} {} bytes", frame.kind(), frame.len());
//!         frames += 1;
//!     }
//!     println!("{} frames in {} records", frames, reader.records_read());
//!     Ok(())
//! }
//! ```
//!
//! End of stream at a record boundary is a normal termination. A stream that
//! ends inside a record is a malformed capture and aborts the load.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, trace};

use super::format::{
    BTSNOOP_RECORD_HEADER_SIZE, BtsnoopHeader, BtsnoopRecordHeader, Datalink,
    HCIDUMP_HEADER_SIZE, HcidumpRecordHeader, PKTLOG_HEADER_SIZE, PktlogRecordHeader,
    btsnoop_to_timeval, check_record_len, monitor_indicator, read_n, read_payload, skip_n,
};
use crate::sequence::Sequence;
use crate::types::Frame;
use crate::{ReplayError, Result};

/// Supported capture file formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CaptureFormat {
    #[default]
    Btsnoop,
    Pktlog,
    Hcidump,
}

/// Outcome of decoding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Frame(Frame),
    /// A record was consumed but carried no HCI packet; read again.
    Skipped,
    /// The stream ended cleanly at a record boundary.
    End,
}

/// Sequential record reader over any byte source.
pub struct CaptureReader<R> {
    reader: R,
    format: CaptureFormat,
    datalink: Option<Datalink>,
    source: String,
    records: usize,
}

impl CaptureReader<BufReader<File>> {
    /// Open a capture file; for btsnoop the file header is validated here.
    pub fn open<P: AsRef<Path>>(path: P, format: CaptureFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ReplayError::file_error(path.to_path_buf(), e))?;
        Self::with_source(BufReader::new(file), format, path.display().to_string())
            .map_err(|e| attach_path(e, path))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(reader: R, format: CaptureFormat) -> Result<Self> {
        Self::with_source(reader, format, "<memory>".to_string())
    }

    fn with_source(mut reader: R, format: CaptureFormat, source: String) -> Result<Self> {
        let datalink = match format {
            CaptureFormat::Btsnoop => {
                let header = BtsnoopHeader::parse_from_reader(&mut reader)?;
                header.validate()?;
                if let Datalink::Other(raw) = header.datalink {
                    info!("{}: datalink type {} is not HCI, records will be skipped", source, raw);
                } else {
                    debug!("{}: btsnoop datalink {:?}", source, header.datalink);
                }
                Some(header.datalink)
            }
            CaptureFormat::Pktlog | CaptureFormat::Hcidump => None,
        };

        Ok(Self { reader, format, datalink, source, records: 0 })
    }

    /// Number of records consumed so far, including skipped ones.
    pub fn records_read(&self) -> usize {
        self.records
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Decode the next record.
    pub fn read_record(&mut self) -> Result<Record> {
        let record = match self.format {
            CaptureFormat::Btsnoop => self.read_btsnoop()?,
            CaptureFormat::Pktlog => self.read_pktlog()?,
            CaptureFormat::Hcidump => self.read_hcidump()?,
        };
        if record != Record::End {
            self.records += 1;
        }
        Ok(record)
    }

    /// Decode records until one carries a frame or the stream ends.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.read_record()? {
                Record::Frame(frame) => return Ok(Some(frame)),
                Record::Skipped => continue,
                Record::End => return Ok(None),
            }
        }
    }

    fn context(&self) -> String {
        format!("{} record {}", self.source, self.records + 1)
    }

    /// Read a fixed-size record header; `false` on clean end of stream.
    fn read_header(&mut self, buf: &mut [u8]) -> Result<bool> {
        let n = read_n(&mut self.reader, buf)?;
        if n == 0 {
            return Ok(false);
        }
        if n != buf.len() {
            return Err(ReplayError::malformed(
                self.context(),
                format!("truncated record header ({} of {} bytes)", n, buf.len()),
            ));
        }
        Ok(true)
    }

    fn read_btsnoop(&mut self) -> Result<Record> {
        let mut raw = [0u8; BTSNOOP_RECORD_HEADER_SIZE];
        if !self.read_header(&mut raw)? {
            return Ok(Record::End);
        }

        let context = self.context();
        let header = BtsnoopRecordHeader::parse(&raw)?;
        let len = header.included_len as usize;
        check_record_len(len, &context)?;
        let timestamp = btsnoop_to_timeval(header.timestamp);
        trace!("{}: len={} flags={:#x} ts={}", context, len, header.flags, timestamp);

        let (indicator, direction) = match self.datalink {
            Some(Datalink::Hci) => (Some(header.hci_indicator()), header.direction()),
            Some(Datalink::Uart) => (None, header.direction()),
            Some(Datalink::Monitor) => match monitor_indicator(header.monitor_opcode()) {
                Some((indicator, direction)) => (Some(indicator), direction),
                None => {
                    trace!("{}: monitor opcode {} skipped", context, header.monitor_opcode());
                    skip_n(&mut self.reader, len, &context)?;
                    return Ok(Record::Skipped);
                }
            },
            Some(Datalink::Other(_)) | None => {
                skip_n(&mut self.reader, len, &context)?;
                return Ok(Record::Skipped);
            }
        };

        let data = match indicator {
            Some(indicator) => {
                let mut data = vec![0u8; len + 1];
                data[0] = indicator;
                read_payload(&mut self.reader, &mut data[1..], &context)?;
                data
            }
            None => {
                let mut data = vec![0u8; len];
                read_payload(&mut self.reader, &mut data, &context)?;
                data
            }
        };

        Ok(Record::Frame(Frame::new(direction, data, timestamp)))
    }

    fn read_pktlog(&mut self) -> Result<Record> {
        let mut raw = [0u8; PKTLOG_HEADER_SIZE];
        if !self.read_header(&mut raw)? {
            return Ok(Record::End);
        }

        let context = self.context();
        let header = PktlogRecordHeader::parse(&raw)?;
        let len = header.payload_len()?;
        check_record_len(len, &context)?;

        let Some((indicator, direction)) = header.indicator() else {
            trace!("{}: unknown pktlog type {:#04x} skipped", context, header.packet_type);
            skip_n(&mut self.reader, len, &context)?;
            return Ok(Record::Skipped);
        };

        let mut data = vec![0u8; len + 1];
        data[0] = indicator;
        read_payload(&mut self.reader, &mut data[1..], &context)?;

        Ok(Record::Frame(Frame::new(direction, data, header.timeval())))
    }

    fn read_hcidump(&mut self) -> Result<Record> {
        let mut raw = [0u8; HCIDUMP_HEADER_SIZE];
        if !self.read_header(&mut raw)? {
            return Ok(Record::End);
        }

        let context = self.context();
        let header = HcidumpRecordHeader::parse(&raw)?;
        let mut data = vec![0u8; usize::from(header.len)];
        read_payload(&mut self.reader, &mut data, &context)?;

        Ok(Record::Frame(Frame::new(header.direction(), data, header.timeval())))
    }
}

/// Give path-less I/O errors raised while reading a file its path.
fn attach_path(err: ReplayError, path: &Path) -> ReplayError {
    match err {
        ReplayError::File { path: unknown, source } if unknown == Path::new("<unknown>") => {
            ReplayError::file_error(path.to_path_buf(), source)
        }
        other => other,
    }
}

/// Append every frame of one capture file to `seq`. Returns the frame count.
pub fn load_capture<P: AsRef<Path>>(
    path: P,
    format: CaptureFormat,
    seq: &mut Sequence,
) -> Result<usize> {
    let path = path.as_ref();
    let mut reader = CaptureReader::open(path, format)?;
    let mut count = 0;
    while let Some(frame) = reader.next_frame().map_err(|e| attach_path(e, path))? {
        seq.append(frame);
        count += 1;
    }
    info!("Loaded {} packets from {} ({} records)", count, path.display(), reader.records_read());
    Ok(count)
}

/// Load several capture files, in order, into one sequence.
pub fn load_captures<P: AsRef<Path>>(
    paths: &[P],
    format: CaptureFormat,
    seq: &mut Sequence,
) -> Result<usize> {
    let mut total = 0;
    for path in paths {
        total += load_capture(path, format, seq)?;
    }
    Ok(total)
}
