use std::io::ErrorKind;

use linepipe_frame::{CodecError, FrameError};
use linepipe_transport::TransportError;

/// Errors surfaced by sessions.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// No connectable endpoint exists under the name, or the name is taken.
    #[error("pipe {name:?} is unavailable: {source}")]
    EndpointUnavailable {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused access to the endpoint.
    #[error("access to pipe {name:?} denied: {source}")]
    AccessDenied {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The peer closed the stream, or it was aborted locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// A received line could not be turned back into a value. The line has
    /// been consumed and the session is still usable.
    #[error("received message could not be decoded: {0}")]
    Decode(#[source] CodecError),

    /// The value to send cannot be represented on the wire.
    #[error("message could not be serialized: {0}")]
    Serialization(#[source] CodecError),

    /// The session has been closed.
    #[error("session already closed")]
    AlreadyClosed,

    /// The logical pipe name cannot be used.
    #[error("invalid pipe name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The platform transport cannot do what was asked.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Any other I/O failure, including read/write timeouts.
    #[error("pipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An async operation was cancelled before it completed.
    #[cfg(feature = "async")]
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PipeError>;

impl PipeError {
    /// Classify a transport failure for the endpoint `name`.
    pub fn from_transport(name: &str, err: TransportError) -> Self {
        if err.is_endpoint_unavailable() {
            return PipeError::EndpointUnavailable {
                name: name.to_string(),
                source: into_io(err),
            };
        }
        if err.is_access_denied() {
            return PipeError::AccessDenied {
                name: name.to_string(),
                source: into_io(err),
            };
        }
        match err {
            TransportError::InvalidName { name, reason } => PipeError::InvalidName { name, reason },
            TransportError::PathTooLong { .. } => PipeError::InvalidName {
                name: name.to_string(),
                reason: "endpoint path too long for this platform",
            },
            TransportError::Unsupported(what) => PipeError::Unsupported(what),
            other => classify_io(into_io(other)),
        }
    }
}

impl From<FrameError> for PipeError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(io) => classify_io(io),
            FrameError::ConnectionClosed => PipeError::ConnectionClosed,
            FrameError::InvalidText => PipeError::Decode(CodecError::Text),
            FrameError::EmbeddedTerminator => PipeError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                FrameError::EmbeddedTerminator.to_string(),
            )),
        }
    }
}

fn into_io(err: TransportError) -> std::io::Error {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => source,
        other => std::io::Error::other(other.to_string()),
    }
}

fn classify_io(err: std::io::Error) -> PipeError {
    match err.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::UnexpectedEof => PipeError::ConnectionClosed,
        ErrorKind::Unsupported => PipeError::Unsupported(err.to_string()),
        _ => PipeError::Io(err),
    }
}
