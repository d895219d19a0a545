//! Capture file reading (btsnoop, pktlog and legacy hcidump)
//!
//! Each parser turns one on-disk record into a normalized [`crate::Frame`].

pub mod format;
pub mod reader;

pub use reader::{CaptureFormat, CaptureReader, Record, load_capture, load_captures};
