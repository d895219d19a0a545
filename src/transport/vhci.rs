//! Linux virtual HCI device transport.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::unix::AsyncFd;
use tracing::{debug, info, trace};

use super::Transport;
use crate::types::HCI_MAX_FRAME_SIZE;
use crate::{ReplayError, Result};

pub const DEFAULT_VHCI_PATH: &str = "/dev/vhci";

/// The kernel side of `/dev/vhci` acts as the host stack; this end plays the
/// controller. Every read returns exactly one H4 frame.
///
/// The device is opened non-blocking and driven by readiness, so an inbound
/// wait that times out leaves nothing in flight.
pub struct VhciTransport {
    fd: AsyncFd<File>,
    path: PathBuf,
    buf: Box<[u8; HCI_MAX_FRAME_SIZE]>,
}

fn read_failed(e: std::io::Error) -> ReplayError {
    ReplayError::transport_failed_with_source("read from virtual HCI device failed", Box::new(e))
}

fn write_failed(e: std::io::Error) -> ReplayError {
    ReplayError::transport_failed_with_source("write to virtual HCI device failed", Box::new(e))
}

impl VhciTransport {
    /// Open the device and register it with the runtime's reactor.
    ///
    /// Must be called from within a tokio runtime with I/O enabled.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|e| {
                ReplayError::transport_failed_with_source(
                    format!("failed to open {}", path.display()),
                    Box::new(e),
                )
            })?;

        // regular files cannot be polled and are refused here
        let fd = AsyncFd::new(file).map_err(|e| {
            ReplayError::transport_failed_with_source(
                format!("cannot poll {}", path.display()),
                Box::new(e),
            )
        })?;

        info!("Opened virtual HCI device {}", path.display());
        Ok(Self { fd, path, buf: Box::new([0u8; HCI_MAX_FRAME_SIZE]) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let n = loop {
            let mut guard = self.fd.readable().await.map_err(read_failed)?;
            match guard.try_io(|inner| inner.get_ref().read(&mut self.buf[..])) {
                Ok(result) => break result.map_err(read_failed)?,
                Err(_would_block) => continue,
            }
        };
        if n == 0 {
            return Err(ReplayError::transport_failed("virtual HCI device closed"));
        }
        trace!("vhci: read {} bytes", n);
        Ok(self.buf[..n].to_vec())
    }
}

#[async_trait::async_trait]
impl Transport for VhciTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        // one write per frame; the device takes whole packets only
        let n = loop {
            let mut guard = self.fd.writable().await.map_err(write_failed)?;
            match guard.try_io(|inner| inner.get_ref().write(frame)) {
                Ok(result) => break result.map_err(write_failed)?,
                Err(_would_block) => continue,
            }
        };
        if n != frame.len() {
            return Err(ReplayError::transport_failed(format!(
                "short write to virtual HCI device: {} of {} bytes",
                n,
                frame.len()
            )));
        }
        trace!("vhci: wrote {} bytes", n);
        Ok(())
    }

    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        match timeout {
            None => self.read_frame().await.map(Some),
            Some(limit) => match tokio::time::timeout(limit, self.read_frame()).await {
                Ok(frame) => frame.map(Some),
                Err(_) => {
                    debug!("vhci: no data within {:?}", limit);
                    Ok(None)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    use anyhow::ensure;

    fn make_fifo(dir: &tempfile::TempDir) -> anyhow::Result<PathBuf> {
        let path = dir.path().join("vhci");
        let c_path = CString::new(path.as_os_str().as_bytes())?;
        // SAFETY: c_path is NUL-terminated and outlives the call
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        ensure!(rc == 0, "mkfifo failed: {}", std::io::Error::last_os_error());
        Ok(path)
    }

    #[tokio::test]
    async fn open_failure_is_a_transport_error() {
        let err = VhciTransport::open("/nonexistent/vhci").await.err();
        assert!(matches!(err, Some(ReplayError::Transport { .. })));
        assert!(err.is_some_and(|e| e.is_retryable()));
    }

    #[tokio::test]
    async fn regular_files_are_not_pollable() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let err = VhciTransport::open(file.path()).await.err();
        ensure!(matches!(err, Some(ReplayError::Transport { .. })), "got {:?}", err);
        Ok(())
    }

    #[tokio::test]
    async fn timed_out_wait_leaves_the_device_usable() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = make_fifo(&dir)?;
        let mut transport = VhciTransport::open(&path).await?;
        assert_eq!(transport.path(), path.as_path());

        // nothing written yet
        let frame = transport.recv(Some(Duration::from_millis(50))).await?;
        ensure!(frame.is_none(), "expected a timeout, got {:?}", frame);

        let sent = tokio::time::timeout(Duration::from_secs(1), transport.send(&[0x04, 0x0e, 0x00])).await;
        ensure!(matches!(sent, Ok(Ok(()))), "send after a timed out wait did not complete: {:?}", sent);

        // the fifo loops our own write back first
        let echo = transport.recv(Some(Duration::from_secs(1))).await?;
        assert_eq!(echo, Some(vec![0x04, 0x0e, 0x00]));

        let mut host = OpenOptions::new().write(true).open(&path)?;
        host.write_all(&[0x01, 0x03, 0x0c, 0x00])?;

        let command = transport.recv(Some(Duration::from_secs(1))).await?;
        assert_eq!(command, Some(vec![0x01, 0x03, 0x0c, 0x00]));
        Ok(())
    }

    #[tokio::test]
    async fn unbounded_wait_returns_the_next_frame() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = make_fifo(&dir)?;
        let mut transport = VhciTransport::open(&path).await?;

        let mut host = OpenOptions::new().write(true).open(&path)?;
        host.write_all(&[0x01, 0x01, 0x0c, 0x00])?;

        let frame = tokio::time::timeout(Duration::from_secs(1), transport.recv(None)).await?;
        assert_eq!(frame?, Some(vec![0x01, 0x01, 0x0c, 0x00]));
        Ok(())
    }
}
