//! Listener/dialer sessions over named pipes.
//!
//! A [`Session`] carries one serde value per line in each direction. It is
//! produced either by binding a name and accepting one peer ([`listen`],
//! [`PipeListener`]) or by dialing an existing name ([`dial`]).
//!
//! ```no_run
//! use linepipe_session::{dial, listen};
//!
//! # fn main() -> linepipe_session::Result<()> {
//! let server = std::thread::spawn(|| -> linepipe_session::Result<()> {
//!     let mut session = listen("build-agent")?;
//!     let job: serde_json::Value = session.receive()?;
//!     session.send(&job)
//! });
//!
//! let mut session = dial("build-agent")?;
//! session.send(&serde_json::json!({"job": 1}))?;
//! let echoed = session.receive_value()?;
//! # let _ = (server, echoed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod listener;
pub mod session;

#[cfg(feature = "async")]
pub mod async_session;

pub use config::{DialConfig, SessionConfig};
pub use connector::{dial, dial_host, dial_with_config};
pub use error::{PipeError, Result};
pub use listener::{listen, listen_in, PipeListener};
pub use session::{AbortHandle, Role, Session};

#[cfg(feature = "async")]
pub use async_session::{
    dial_async, dial_async_with_config, listen_async, AsyncPipeListener, AsyncSession,
};
