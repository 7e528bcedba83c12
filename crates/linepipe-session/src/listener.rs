use std::path::Path;

use linepipe_transport::{EndpointCleanup, PipeNamespace, PipeServer};
use tracing::info;

use crate::config::SessionConfig;
use crate::error::{PipeError, Result};
use crate::session::{Role, Session};

/// A bound endpoint that accepts exactly one peer.
///
/// The name is visible to the registry from [`bind`](PipeListener::bind)
/// on. [`accept`](PipeListener::accept) consumes the listener, so a second
/// accept is impossible, and later dialers are refused.
pub struct PipeListener {
    server: PipeServer,
    config: SessionConfig,
}

impl PipeListener {
    /// Bind `name` in the default namespace.
    pub fn bind(name: &str) -> Result<Self> {
        Self::bind_in(&PipeNamespace::default(), name)
    }

    /// Bind `name` in `namespace`.
    pub fn bind_in(namespace: &PipeNamespace, name: &str) -> Result<Self> {
        let server =
            PipeServer::bind(namespace, name).map_err(|e| PipeError::from_transport(name, e))?;
        Ok(Self {
            server,
            config: SessionConfig::default(),
        })
    }

    /// Override the settings of the session produced by `accept`.
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Block until one peer connects. No timeout.
    pub fn accept(self) -> Result<Session> {
        let name = self.server.name().to_string();
        info!(pipe = %name, transport = self.server.transport_name(), "waiting for peer");
        let (stream, guard) = self
            .server
            .accept()
            .map_err(|e| PipeError::from_transport(&name, e))?;
        Session::from_stream(&name, Role::Listener, stream, Some(guard), &self.config)
    }

    /// Logical pipe name.
    pub fn name(&self) -> &str {
        self.server.name()
    }

    /// OS path of the bound endpoint.
    pub fn path(&self) -> &Path {
        self.server.path()
    }

    /// Handle that removes the endpoint from another thread if it is still
    /// the one this listener created.
    pub fn cleanup(&self) -> EndpointCleanup {
        self.server.cleanup()
    }
}

/// Bind `name` in the default namespace and wait for one peer.
pub fn listen(name: &str) -> Result<Session> {
    PipeListener::bind(name)?.accept()
}

/// Bind `name` in `namespace` and wait for one peer.
pub fn listen_in(namespace: &PipeNamespace, name: &str) -> Result<Session> {
    PipeListener::bind_in(namespace, name)?.accept()
}

#[cfg(all(test, unix))]
mod tests {
    use std::thread;

    use super::*;
    use crate::connector::dial_with_config;
    use crate::config::DialConfig;

    fn make_namespace(tag: &str) -> PipeNamespace {
        PipeNamespace::new(format!(
            "/tmp/lps-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[test]
    fn accept_returns_listener_session() {
        let ns = make_namespace("accept");
        let listener = PipeListener::bind_in(&ns, "accept").expect("listener should bind");
        assert_eq!(listener.name(), "accept");
        assert!(listener.path().exists());

        let cfg = DialConfig::default().with_namespace(ns.clone());
        let client = thread::spawn(move || {
            dial_with_config("accept", &cfg).expect("client should connect")
        });

        let session = listener.accept().expect("listener should accept");
        assert_eq!(session.role(), Role::Listener);
        assert_eq!(session.name(), "accept");

        let client = client.join().expect("client thread should finish");
        assert_eq!(client.role(), Role::Dialer);
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn rebinding_a_bound_name_is_unavailable() {
        let ns = make_namespace("rebind");
        let _first = PipeListener::bind_in(&ns, "dup").expect("first bind should succeed");
        let err = PipeListener::bind_in(&ns, "dup").err().expect("second bind should fail");
        assert!(matches!(err, PipeError::EndpointUnavailable { .. }));
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn name_of_crashed_listener_can_be_listened_on() {
        let ns = make_namespace("crashed");
        std::fs::create_dir_all(ns.root()).expect("namespace root should be created");
        let path = ns.endpoint_path("svc").expect("name should be valid");
        drop(std::os::unix::net::UnixListener::bind(&path).expect("raw bind should succeed"));
        assert!(!linepipe_transport::pipe_exists_in(&ns, "svc").expect("listing should succeed"));

        let listener = PipeListener::bind_in(&ns, "svc").expect("stale name should be reusable");
        let cfg = DialConfig::default().with_namespace(ns.clone());
        let dialer = thread::spawn(move || dial_with_config("svc", &cfg).expect("dial should connect"));
        let mut server = listener.accept().expect("listener should accept");
        let mut client = dialer.join().expect("dialer thread should finish");

        client.send("hello").expect("send should succeed");
        let got: String = server.receive().expect("receive should succeed");
        assert_eq!(got, "hello");
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn invalid_names_are_rejected() {
        let ns = make_namespace("names");
        for name in ["", "a/b", "nul\0byte"] {
            let err = PipeListener::bind_in(&ns, name).err().expect("bind should fail");
            assert!(
                matches!(err, PipeError::InvalidName { .. }),
                "{name:?} gave {err}"
            );
        }
    }

    #[test]
    fn spent_listener_refuses_second_dialer() {
        let ns = make_namespace("spent");
        let listener = PipeListener::bind_in(&ns, "once").expect("listener should bind");

        let cfg = DialConfig::default().with_namespace(ns.clone());
        let first_cfg = cfg.clone();
        let first = thread::spawn(move || {
            dial_with_config("once", &first_cfg).expect("first dial should connect")
        });
        let _server = listener.accept().expect("listener should accept");
        let _first = first.join().expect("first dialer should finish");

        let err = dial_with_config("once", &cfg).expect_err("second dial should fail");
        assert!(matches!(err, PipeError::EndpointUnavailable { .. }));
        let _ = std::fs::remove_dir_all(ns.root());
    }
}
