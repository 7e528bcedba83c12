use linepipe_transport::TransportError;

/// Errors that can occur while reading or writing lines.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading or writing lines.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream before a complete line was received.
    #[error("connection closed (incomplete line)")]
    ConnectionClosed,

    /// A received line is not valid UTF-8. The line has been consumed.
    #[error("received line is not valid UTF-8")]
    InvalidText,

    /// An outgoing token contains a line terminator.
    #[error("token contains an embedded line terminator")]
    EmbeddedTerminator,
}

pub type Result<T> = std::result::Result<T, FrameError>;

impl From<TransportError> for FrameError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(source)
            | TransportError::Accept(source)
            | TransportError::Bind { source, .. }
            | TransportError::Connect { source, .. } => FrameError::Io(source),
            TransportError::Unsupported(what) => {
                FrameError::Io(std::io::Error::new(std::io::ErrorKind::Unsupported, what))
            }
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// Errors from turning values into tokens and back.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value cannot be represented as JSON.
    #[error("value cannot be serialized: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The token is not valid base64.
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not valid UTF-16LE text.
    #[error("token payload is not valid UTF-16LE: {0}")]
    Utf16(&'static str),

    /// The line carrying the token is not valid UTF-8.
    #[error("received line is not valid text")]
    Text,

    /// The decoded text is not valid JSON for the requested type.
    #[error("token payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
}
