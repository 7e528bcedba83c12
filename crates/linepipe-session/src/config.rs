use std::time::Duration;

use linepipe_frame::LineConfig;
use linepipe_transport::{ImpersonationLevel, PipeNamespace, LOCAL_HOST};

/// Per-session I/O settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum time a `receive` waits for a line. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Maximum time a `send` waits for the transport. `None` waits forever.
    pub write_timeout: Option<Duration>,
}

impl SessionConfig {
    pub(crate) fn line_config(&self) -> LineConfig {
        LineConfig {
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

/// How a dialer reaches its endpoint.
#[derive(Debug, Clone)]
pub struct DialConfig {
    /// Host the pipe lives on. `"."`, `"local"`, `"localhost"` and `""` all
    /// mean this machine.
    pub host: String,
    /// Impersonation rights granted to the server. Defaults to the maximum.
    pub impersonation: ImpersonationLevel,
    /// Namespace the name is resolved in.
    pub namespace: PipeNamespace,
    /// Settings for the resulting session.
    pub session: SessionConfig,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            host: LOCAL_HOST.to_string(),
            impersonation: ImpersonationLevel::MAXIMUM,
            namespace: PipeNamespace::default(),
            session: SessionConfig::default(),
        }
    }
}

impl DialConfig {
    /// Dial `host` instead of the local machine.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Resolve names in `namespace`.
    pub fn with_namespace(mut self, namespace: PipeNamespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Override the session settings.
    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_defaults_to_local_host_and_maximum_impersonation() {
        let cfg = DialConfig::default();
        assert_eq!(cfg.host, LOCAL_HOST);
        assert_eq!(cfg.impersonation, ImpersonationLevel::MAXIMUM);
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn session_config_maps_to_line_config() {
        let cfg = SessionConfig {
            read_timeout: Some(Duration::from_secs(1)),
            write_timeout: None,
        };
        let line = cfg.line_config();
        assert_eq!(line.read_timeout, Some(Duration::from_secs(1)));
        assert_eq!(line.write_timeout, None);
    }
}
