//! Named pipe transport for linepipe.
//!
//! Provides one endpoint model over two OS mechanisms:
//! - Unix domain sockets inside a namespace directory (Linux/macOS)
//! - Named pipes under `\\.\pipe\` (Windows)
//!
//! This is the lowest layer. It creates and dials endpoints, hands out
//! connected [`PipeStream`]s, and lists what is open via the [`registry`].

pub mod error;
pub mod impersonation;
pub mod namespace;
pub mod registry;
pub mod stream;

#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

#[cfg(feature = "async")]
pub mod async_io;

pub use error::{Result, TransportError};
pub use impersonation::ImpersonationLevel;
pub use namespace::{is_local_host, validate_name, PipeNamespace, LOCAL_HOST};
pub use registry::{list_pipes, list_pipes_in, pipe_exists, pipe_exists_in, PipeEntry};
pub use stream::PipeStream;

#[cfg(unix)]
pub use namespace::DEFAULT_UNIX_ROOT;
#[cfg(unix)]
pub use unix::{connect, EndpointCleanup, EndpointGuard, PipeServer, LOCK_DIR};

#[cfg(windows)]
pub use namespace::WINDOWS_PIPE_ROOT;
#[cfg(windows)]
pub use windows::{connect, EndpointCleanup, EndpointGuard, PipeServer};

#[cfg(feature = "async")]
pub use async_io::{connect_async, AsyncPipeServer, AsyncPipeStream};
