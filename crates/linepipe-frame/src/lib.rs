//! Line framing for linepipe.
//!
//! One message is one line: a token produced by [`codec::encode`] followed by
//! `\n`. Readers also accept `\r\n`. Tokens are
//! `base64(UTF-16LE(JSON(value)))`, so they never contain a terminator.
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod config;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{decode, decode_text, decode_value, encode};
pub use config::LineConfig;
pub use error::{CodecError, FrameError, Result};
pub use reader::LineReader;
pub use writer::LineWriter;

#[cfg(feature = "async")]
pub use async_codec::TokenLineCodec;
