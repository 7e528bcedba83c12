use std::path::PathBuf;

/// Errors that can occur in pipe transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create the endpoint for the specified name.
    #[error("failed to bind pipe {name} at {path}: {source}")]
    Bind {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified endpoint.
    #[error("failed to connect to pipe {name} on {host}: {source}")]
    Connect {
        name: String,
        host: String,
        source: std::io::Error,
    },

    /// Failed while waiting for a peer to connect.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The logical pipe name cannot be mapped into the namespace.
    #[error("invalid pipe name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The endpoint path is too long for the platform.
    #[error("pipe path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The requested operation is not available on this platform.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// The underlying OS error, if the failure came from the operating system.
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
                Some(source)
            }
            TransportError::Accept(err) | TransportError::Io(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the failure means no connectable endpoint exists under the
    /// name: nothing bound, nothing listening, or the name already taken.
    pub fn is_endpoint_unavailable(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            TransportError::Bind { source, .. } => {
                matches!(source.kind(), ErrorKind::AddrInUse | ErrorKind::AlreadyExists)
            }
            TransportError::Connect { source, .. } => {
                matches!(
                    source.kind(),
                    ErrorKind::NotFound | ErrorKind::ConnectionRefused
                ) || is_pipe_busy(source)
            }
            _ => false,
        }
    }

    /// Whether the OS refused the operation on security grounds.
    pub fn is_access_denied(&self) -> bool {
        self.io_source()
            .is_some_and(|err| err.kind() == std::io::ErrorKind::PermissionDenied)
    }
}

#[cfg(windows)]
fn is_pipe_busy(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(crate::windows::PIPE_BUSY_CODE)
}

#[cfg(not(windows))]
fn is_pipe_busy(_err: &std::io::Error) -> bool {
    false
}

pub type Result<T> = std::result::Result<T, TransportError>;
