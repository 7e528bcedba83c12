//! Line codec for `tokio_util::codec::{FramedRead, FramedWrite}`.
//!
//! Each item is one token with the `\n` (and any preceding `\r`) removed.
//! Decoding the token into a value stays with the caller.

use bytes::BytesMut;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

use crate::error::FrameError;

/// Token-per-line codec for async pipe streams.
///
/// Line splitting is delegated to [`AnyDelimiterCodec`], which remembers how
/// far it has searched between reads. It hands back raw bytes: a `FramedRead`
/// stops for good after its decoder errors, so bytes that are not UTF-8 are
/// passed on lossily instead. They can never form a valid token, and the
/// caller's token decode reports them while the stream stays readable.
#[derive(Debug, Clone)]
pub struct TokenLineCodec {
    lines: AnyDelimiterCodec,
}

impl TokenLineCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self {
            lines: AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec()),
        }
    }
}

impl Default for TokenLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TokenLineCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(chunk) = self.lines.decode(src).map_err(map_codec_error)? else {
            return Ok(None);
        };
        let line = chunk.strip_suffix(b"\r").unwrap_or(&chunk[..]);
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }

    /// At EOF only complete lines count. Trailing bytes without a terminator
    /// are dropped so the stream ends and the caller sees the peer as gone.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => {
                if !src.is_empty() {
                    tracing::trace!(buffered = src.len(), "stream ended mid-line");
                    src.clear();
                    // The inner codec's search offset pointed into the dropped bytes.
                    *self = Self::new();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for TokenLineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.bytes().any(|b| b == b'\n' || b == b'\r') {
            return Err(FrameError::EmbeddedTerminator);
        }
        self.lines.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(err: AnyDelimiterCodecError) -> FrameError {
    match err {
        AnyDelimiterCodecError::Io(io) => FrameError::Io(io),
        // Not produced without a length limit.
        AnyDelimiterCodecError::MaxChunkLengthExceeded => FrameError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "line too long",
        )),
    }
}
