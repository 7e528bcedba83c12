use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;
#[cfg(windows)]
use crate::error::TransportError;

/// A connected pipe endpoint. Implements `Read` + `Write`.
///
/// On Unix this wraps a Unix domain socket stream.
/// On Windows this wraps a byte-mode named pipe handle.
pub struct PipeStream {
    inner: PipeStreamInner,
}

enum PipeStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(windows)]
    Windows(std::fs::File),
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(windows)]
            PipeStreamInner::Windows(pipe) => match pipe.read(buf) {
                // A closed peer shows up as ERROR_BROKEN_PIPE rather than EOF.
                Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(0),
                other => other,
            },
        }
    }
}

impl Write for PipeStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(windows)]
            PipeStreamInner::Windows(pipe) => pipe.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.flush(),
            #[cfg(windows)]
            PipeStreamInner::Windows(pipe) => pipe.flush(),
        }
    }
}

impl PipeStream {
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: PipeStreamInner::Unix(stream),
        }
    }

    #[cfg(windows)]
    pub(crate) fn from_windows(pipe: std::fs::File) -> Self {
        Self {
            inner: PipeStreamInner::Windows(pipe),
        }
    }

    /// Set read timeout on the underlying stream.
    ///
    /// Synchronous Windows pipe handles have no timeout support; only `None`
    /// is accepted there.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(windows)]
            PipeStreamInner::Windows(_) => reject_timeout(timeout),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(windows)]
            PipeStreamInner::Windows(_) => reject_timeout(timeout),
        }
    }

    /// Try to clone this stream (duplicates the OS handle).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            #[cfg(windows)]
            PipeStreamInner::Windows(pipe) => Ok(Self::from_windows(pipe.try_clone()?)),
        }
    }

    /// Shut the connection down in both directions.
    ///
    /// Blocked reads on any clone of this stream return end-of-stream.
    /// Errors from a peer that already went away are ignored.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => match stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
            #[cfg(windows)]
            PipeStreamInner::Windows(pipe) => crate::windows::cancel_pending_io(pipe),
        }
    }
}

#[cfg(windows)]
fn reject_timeout(timeout: Option<Duration>) -> Result<()> {
    match timeout {
        None => Ok(()),
        Some(_) => Err(TransportError::Unsupported(
            "timeouts on synchronous named pipe handles".to_string(),
        )),
    }
}

impl std::fmt::Debug for PipeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(_) => f.debug_struct("PipeStream").field("type", &"unix").finish(),
            #[cfg(windows)]
            PipeStreamInner::Windows(_) => f
                .debug_struct("PipeStream")
                .field("type", &"named-pipe")
                .finish(),
        }
    }
}
