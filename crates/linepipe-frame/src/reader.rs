use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use linepipe_transport::PipeStream;
use tracing::trace;

use crate::config::LineConfig;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete `\n`-terminated lines from any `Read` stream.
///
/// Handles partial reads internally. Callers always get a whole line with
/// the terminator (and a preceding `\r`, if any) removed.
pub struct LineReader<T> {
    inner: T,
    buf: BytesMut,
    // Bytes at the front of `buf` already known to hold no `\n`.
    scanned: usize,
}

impl<T: Read> LineReader<T> {
    /// Create a new line reader.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scanned: 0,
        }
    }

    /// Read the next complete line (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached before
    /// a terminator, even if a partial line was buffered. A line that is not
    /// valid UTF-8 is consumed and reported as `InvalidText`.
    pub fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(line) = self.next_line() {
                return line;
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.buf.is_empty() {
                    trace!(buffered = self.buf.len(), "stream ended mid-line");
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Split the next complete line off the buffer. The search resumes where
    /// the previous one stopped, so a long line costs one pass over its bytes.
    fn next_line(&mut self) -> Option<Result<String>> {
        let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let newline = self.scanned + offset;
        self.scanned = 0;

        let mut line = self.buf.split_to(newline + 1);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(newline - 1);
        }
        Some(String::from_utf8(line.to_vec()).map_err(|_| FrameError::InvalidText))
    }

    /// Bytes received but not yet returned as a line.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl LineReader<PipeStream> {
    /// Create a line reader for `PipeStream` and apply the read timeout from config.
    pub fn with_config_pipe(inner: PipeStream, config: LineConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::new(inner))
    }
}
