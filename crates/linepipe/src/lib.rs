//! Session-oriented structured messaging over named pipes.
//!
//! linepipe connects exactly two local processes (or, on Windows, a process
//! and a remote pipe server) and carries one serde value per line between
//! them. Lines are `base64(UTF-16LE(JSON))`, so payloads never need escaping.
//!
//! # Crate Structure
//!
//! - [`transport`]: Endpoint creation, dialing and the pipe registry
//! - [`frame`]: Value tokens and line framing
//! - [`session`]: Listener/dialer sessions (async behind the `async` feature)
//!
//! The most common entry points are re-exported at the root:
//!
//! ```no_run
//! # fn main() -> linepipe::Result<()> {
//! for pipe in linepipe::list_pipes().map_err(std::io::Error::other)? {
//!     println!("{}", pipe.name);
//! }
//! let mut session = linepipe::dial("build-agent")?;
//! session.send(&serde_json::json!({"cmd": "status"}))?;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use linepipe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use linepipe_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use linepipe_session::*;
}

pub use linepipe_session::{
    dial, dial_host, dial_with_config, listen, listen_in, AbortHandle, DialConfig, PipeError,
    PipeListener, Result, Role, Session, SessionConfig,
};
pub use linepipe_transport::{
    list_pipes, list_pipes_in, pipe_exists, pipe_exists_in, PipeEntry, PipeNamespace,
};

#[cfg(feature = "async")]
pub use linepipe_session::{
    dial_async, dial_async_with_config, listen_async, AsyncPipeListener, AsyncSession,
};
