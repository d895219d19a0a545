//! Error types for capture loading, configuration and replay.
//!
//! Every failure the replayer can hit is one of a small number of categories.
//! All of them are fatal for the run. Normal outcomes such as end of capture,
//! an inbound timeout or a mismatched packet are not errors and never show up
//! here.
//!
//! ## Error Categories
//!
//! - **File Errors**: a capture or directive file could not be opened or read
//! - **Capture Errors**: bad magic, unsupported header version, truncated record
//! - **Configuration Errors**: a directive line failed to parse (carries the 1-based line)
//! - **Transport Errors**: the virtual controller could not be opened, read or written
//! - **Emulator Errors**: the emulated peer could not be created
//!
//! ```rust
//! use hcireplay::ReplayError;
//!
//! let error = ReplayError::config_error(3, "unknown scope 'HCI_FOO'");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for replay operations.
pub type Result<T, E = ReplayError> = std::result::Result<T, E>;

/// Main error type for replay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReplayError {
    #[error("file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed capture in {context}: {details}")]
    MalformedCapture { context: String, details: String },

    #[error("unsupported capture: {details}")]
    UnsupportedCapture { details: String },

    #[error("error parsing config file - line {line}: {details}")]
    Config { line: usize, details: String },

    #[error("transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("emulated peer failure: {reason}")]
    Emulator { reason: String },
}

impl ReplayError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Only transport failures qualify: a controller that was busy or not yet
    /// created may accept a second attempt. Everything else describes bad input.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReplayError::Transport { .. } => true,
            ReplayError::File { .. } => false,
            ReplayError::MalformedCapture { .. } => false,
            ReplayError::UnsupportedCapture { .. } => false,
            ReplayError::Config { .. } => false,
            ReplayError::Emulator { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ReplayError::File { .. } => {
                vec!["Check the file exists and is readable", "Check file permissions"]
            }
            ReplayError::MalformedCapture { .. } => vec![
                "Verify the capture was not truncated while being copied",
                "Check the --format option matches the capture",
            ],
            ReplayError::UnsupportedCapture { .. } => vec![
                "Convert the capture to btsnoop (datalink 1001 or 1002)",
                "Check the --format option matches the capture",
            ],
            ReplayError::Config { .. } => vec![
                "Check the scope literal (all, HCI_ACL, HCI_CMD_0xOO|0xOOOO, HCI_EVT_0xOO, N, FROM-TO)",
                "Check numeric scopes are listed in ascending order",
                "Check attribute values (action=replay|emulate|skip, delta=<integer>)",
            ],
            ReplayError::Transport { .. } => vec![
                "Load the hci_vhci kernel module",
                "Check read/write permissions on the transport device",
                "Retry once the controller is idle",
            ],
            ReplayError::Emulator { .. } => vec!["Select a different emulator with --emulator"],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        ReplayError::File { path, source }
    }

    /// Helper constructor for malformed capture records.
    pub fn malformed(context: impl Into<String>, details: impl Into<String>) -> Self {
        ReplayError::MalformedCapture { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors at a 1-based line.
    pub fn config_error(line: usize, details: impl Into<String>) -> Self {
        ReplayError::Config { line, details: details.into() }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        ReplayError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ReplayError::Transport { reason: reason.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for ReplayError {
    fn from(err: std::io::Error) -> Self {
        ReplayError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn config_errors_always_name_their_line(line in 1usize..10_000, details in ".*") {
                let msg = ReplayError::config_error(line, details.clone()).to_string();
                let want = format!("line {}", line);
                prop_assert!(msg.contains(&want));
                prop_assert!(msg.contains(&details));
            }

            #[test]
            fn transport_source_chain_is_preserved(base in ".*") {
                let err = ReplayError::transport_failed_with_source(
                    "write",
                    Box::new(std::io::Error::other(base.clone())),
                );
                let source = std::error::Error::source(&err).map(|s| s.to_string());
                prop_assert_eq!(source, Some(base));
            }
        }
    }

    #[test]
    fn error_constructors_validation() {
        let file_error = ReplayError::file_error(
            PathBuf::from("/test.btsnoop"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "test"),
        );
        assert!(matches!(file_error, ReplayError::File { .. }));

        let malformed = ReplayError::malformed("btsnoop record", "truncated");
        assert!(matches!(malformed, ReplayError::MalformedCapture { .. }));

        let transport = ReplayError::transport_failed("open /dev/vhci");
        assert!(matches!(transport, ReplayError::Transport { source: None, .. }));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<ReplayError>();

        let error = ReplayError::transport_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_methods_work() {
        let transport = ReplayError::transport_failed("test");
        let config = ReplayError::config_error(1, "bad scope");
        let capture = ReplayError::malformed("btsnoop header", "bad magic");

        assert!(transport.is_retryable());
        assert!(!config.is_retryable());
        assert!(!capture.is_retryable());

        for error in [&transport, &config, &capture] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn from_conversions_work() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test file");
        let err: ReplayError = io_err.into();

        match err {
            ReplayError::File { path, source } => {
                assert_eq!(path, PathBuf::from("<unknown>"));
                assert_eq!(source.to_string(), "test file");
            }
            other => panic!("Expected File error variant, got {:?}", other),
        }
    }
}
