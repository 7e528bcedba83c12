use std::time::Duration;

/// Timeouts applied to a line reader/writer over a [`PipeStream`].
///
/// [`PipeStream`]: linepipe_transport::PipeStream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineConfig {
    /// Read timeout for blocking reads. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking writes. `None` waits forever.
    pub write_timeout: Option<Duration>,
}
