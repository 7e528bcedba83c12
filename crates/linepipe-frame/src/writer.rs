use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use linepipe_transport::PipeStream;

use crate::config::LineConfig;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes `\n`-terminated lines to any `Write` stream, flushing after each.
pub struct LineWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> LineWriter<T> {
    /// Create a new line writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Write `token` followed by `\n`, then flush (blocking).
    ///
    /// Tokens containing `\r` or `\n` are rejected before anything is written.
    pub fn write_line(&mut self, token: &str) -> Result<()> {
        if token.bytes().any(|b| b == b'\n' || b == b'\r') {
            return Err(FrameError::EmbeddedTerminator);
        }

        self.buf.clear();
        self.buf.reserve(token.len() + 1);
        self.buf.put_slice(token.as_bytes());
        self.buf.put_u8(b'\n');

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl LineWriter<PipeStream> {
    /// Create a line writer for `PipeStream` and apply the write timeout from config.
    pub fn with_config_pipe(inner: PipeStream, config: LineConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::new(inner))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn write_single_line() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_line("hello").unwrap();
        assert_eq!(writer.into_inner().into_inner(), b"hello\n");
    }

    #[test]
    fn write_multiple_lines_in_order() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_line("a").unwrap();
        writer.write_line("").unwrap();
        writer.write_line("c").unwrap();
        assert_eq!(writer.into_inner().into_inner(), b"a\n\nc\n");
    }

    #[test]
    fn rejects_embedded_terminators() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(
            writer.write_line("two\nlines").unwrap_err(),
            FrameError::EmbeddedTerminator
        ));
        assert!(matches!(
            writer.write_line("carriage\r").unwrap_err(),
            FrameError::EmbeddedTerminator
        ));
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[test]
    fn send_flushes_every_line() {
        let flushed = Arc::new(AtomicBool::new(false));
        let mut writer = LineWriter::new(FlushTrackingWriter {
            flushed: Arc::clone(&flushed),
            data: Vec::new(),
        });
        writer.write_line("x").unwrap();
        assert!(flushed.load(Ordering::SeqCst));
    }

    #[test]
    fn interrupted_write_and_flush_are_retried() {
        let mut writer = LineWriter::new(InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        });
        writer.write_line("retry").unwrap();
        assert_eq!(writer.get_ref().data, b"retry\n");
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = LineWriter::new(ZeroWriter);
        assert!(matches!(
            writer.write_line("lost").unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn written_bytes_read_back() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_line("z").unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = crate::reader::LineReader::new(Cursor::new(wire));
        assert_eq!(reader.read_line().unwrap(), "z");
    }

    #[cfg(unix)]
    #[test]
    fn write_to_closed_peer_fails() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        drop(right);
        let mut writer = LineWriter::new(left);
        match writer.write_line("nobody home").unwrap_err() {
            FrameError::Io(err) => assert!(matches!(
                err.kind(),
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
            )),
            other => panic!("unexpected error: {other}"),
        }
    }

    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
