use std::fmt;
use std::io;

use linepipe_session::PipeError;
use linepipe_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidName { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn pipe_error(context: &str, err: PipeError) -> CliError {
    match err {
        PipeError::EndpointUnavailable { .. } | PipeError::Unsupported(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        PipeError::AccessDenied { .. } => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        PipeError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        PipeError::Decode(_) | PipeError::Serialization(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PipeError::InvalidName { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        PipeError::Io(source) => io_error(context, source),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_endpoint_maps_to_transport_code() {
        let err = PipeError::EndpointUnavailable {
            name: "svc".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(pipe_error("dial failed", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn receive_timeout_maps_to_timeout_code() {
        let err = PipeError::Io(io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(pipe_error("receive failed", err).code, TIMEOUT);
    }

    #[test]
    fn closed_session_is_internal() {
        let err = pipe_error("send failed", PipeError::AlreadyClosed);
        assert_eq!(err.code, INTERNAL);
        assert_eq!(err.to_string(), "send failed: session already closed");
    }
}
