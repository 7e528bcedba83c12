use linepipe_frame::{decode, encode, LineReader, LineWriter};
use linepipe_transport::{EndpointGuard, PipeStream};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::{PipeError, Result};

/// Which side of the connection a session was created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Created by accepting a peer on a bound endpoint.
    Listener,
    /// Created by dialing an existing endpoint.
    Dialer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Listener => "listener",
            Role::Dialer => "dialer",
        }
    }
}

/// A connected pipe exchanging one serde value per line.
///
/// Sessions only exist once the connection is established. After
/// [`close`](Session::close) (or drop) every operation except `close`
/// fails with [`PipeError::AlreadyClosed`].
pub struct Session {
    name: String,
    role: Role,
    state: Option<Connected>,
}

// Field order matters: streams close before the guard removes the endpoint.
struct Connected {
    reader: LineReader<PipeStream>,
    writer: LineWriter<PipeStream>,
    control: PipeStream,
    _guard: Option<EndpointGuard>,
}

impl Session {
    pub(crate) fn from_stream(
        name: &str,
        role: Role,
        stream: PipeStream,
        guard: Option<EndpointGuard>,
        config: &SessionConfig,
    ) -> Result<Self> {
        let reader_stream = stream
            .try_clone()
            .map_err(|e| PipeError::from_transport(name, e))?;
        let control = stream
            .try_clone()
            .map_err(|e| PipeError::from_transport(name, e))?;

        let line_config = config.line_config();
        let reader = LineReader::with_config_pipe(reader_stream, line_config)?;
        let writer = LineWriter::with_config_pipe(stream, line_config)?;

        debug!(pipe = %name, role = role.as_str(), "session established");
        Ok(Self {
            name: name.to_string(),
            role,
            state: Some(Connected {
                reader,
                writer,
                control,
                _guard: guard,
            }),
        })
    }

    /// Encode `value` and write it as one line, flushed before returning.
    ///
    /// Fire-and-forget: success means the transport accepted the bytes, not
    /// that the peer read them.
    pub fn send<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let state = self.state.as_mut().ok_or(PipeError::AlreadyClosed)?;
        let token = encode(value).map_err(PipeError::Serialization)?;
        state.writer.write_line(&token)?;
        trace!(pipe = %self.name, bytes = token.len() + 1, "sent message");
        Ok(())
    }

    /// Block until the next line arrives and decode it as `T`.
    ///
    /// A line that fails to decode is consumed; the next call reads the
    /// line after it.
    pub fn receive<T: DeserializeOwned>(&mut self) -> Result<T> {
        let state = self.state.as_mut().ok_or(PipeError::AlreadyClosed)?;
        let line = state.reader.read_line()?;
        trace!(pipe = %self.name, bytes = line.len(), "received line");
        decode(&line).map_err(|err| {
            debug!(pipe = %self.name, error = %err, "discarding undecodable message");
            PipeError::Decode(err)
        })
    }

    /// [`receive`](Session::receive) into an untyped JSON value.
    pub fn receive_value(&mut self) -> Result<serde_json::Value> {
        self.receive()
    }

    /// A handle that can shut this session's stream down from another
    /// thread, failing any blocked `receive` with `ConnectionClosed`.
    pub fn abort_handle(&self) -> Result<AbortHandle> {
        let state = self.state.as_ref().ok_or(PipeError::AlreadyClosed)?;
        let stream = state
            .control
            .try_clone()
            .map_err(|e| PipeError::from_transport(&self.name, e))?;
        Ok(AbortHandle {
            name: self.name.clone(),
            stream,
        })
    }

    /// Release the stream and, for listeners, the endpoint name.
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        let result = state.control.shutdown();
        drop(state);
        debug!(pipe = %self.name, role = self.role.as_str(), "session closed");
        result.map_err(|e| PipeError::from_transport(&self.name, e))
    }

    /// Logical pipe name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Side of the connection this session was created on.
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(pipe = %self.name, error = %err, "session teardown failed");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Cross-thread shutdown for one [`Session`].
#[derive(Debug)]
pub struct AbortHandle {
    name: String,
    stream: PipeStream,
}

impl AbortHandle {
    /// Shut the stream down in both directions. Safe to call more than once
    /// and after the session has closed.
    pub fn abort(&self) -> Result<()> {
        debug!(pipe = %self.name, "aborting session");
        self.stream
            .shutdown()
            .map_err(|e| PipeError::from_transport(&self.name, e))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Write;
    use std::thread;
    use std::time::Duration;

    use linepipe_transport::{pipe_exists_in, ImpersonationLevel, PipeNamespace};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::config::DialConfig;
    use crate::connector::dial_with_config;
    use crate::listener::PipeListener;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Task {
        id: u32,
        args: Vec<String>,
    }

    fn make_namespace(tag: &str) -> PipeNamespace {
        PipeNamespace::new(format!(
            "/tmp/lpx-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    /// Bind `name`, dial it from a helper thread and return both ends.
    fn connected_pair(ns: &PipeNamespace, name: &str) -> (Session, Session) {
        let listener = PipeListener::bind_in(ns, name).expect("listener should bind");
        let cfg = DialConfig::default().with_namespace(ns.clone());
        let name = name.to_string();
        let dialer = thread::spawn(move || dial_with_config(&name, &cfg).expect("dial should connect"));
        let server = listener.accept().expect("listener should accept");
        let client = dialer.join().expect("dialer thread should finish");
        (server, client)
    }

    #[test]
    fn listener_ping_reaches_dialer() {
        let ns = make_namespace("ping");
        let (mut server, mut client) = connected_pair(&ns, "ping");

        server.send("ping").expect("send should succeed");
        let got: String = client.receive().expect("receive should succeed");
        assert_eq!(got, "ping");
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn messages_arrive_in_send_order() {
        let ns = make_namespace("order");
        let (mut server, mut client) = connected_pair(&ns, "order");

        let sent = [
            json!({"step": 1}),
            json!(["two", 2, null]),
            json!("três ✓"),
        ];
        for value in &sent {
            client.send(value).expect("send should succeed");
        }
        for expected in &sent {
            assert_eq!(&server.receive_value().expect("receive should succeed"), expected);
        }
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn multi_mebibyte_values_are_received_whole() {
        let ns = make_namespace("large");
        let (mut server, mut client) = connected_pair(&ns, "large");

        let small = "x".repeat(1024 * 1024);
        let large = "y".repeat(4 * 1024 * 1024);
        let (small_sent, large_sent) = (small.clone(), large.clone());
        let sender = thread::spawn(move || {
            client.send(&small_sent).expect("send should succeed");
            client.send(&large_sent).expect("send should succeed");
            client
        });

        let first: String = server.receive().expect("receive should succeed");
        let second: String = server.receive().expect("receive should succeed");
        assert_eq!(first.len(), small.len());
        assert_eq!(first, small);
        assert_eq!(second, large);

        drop(sender.join().expect("sender thread should finish"));
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn typed_values_roundtrip_both_directions() {
        let ns = make_namespace("typed");
        let (mut server, mut client) = connected_pair(&ns, "typed");

        let task = Task {
            id: 9,
            args: vec!["--fast".into(), String::new()],
        };
        client.send(&task).expect("send should succeed");
        let got: Task = server.receive().expect("receive should succeed");
        assert_eq!(got, task);

        let mut reply = BTreeMap::new();
        reply.insert("status".to_string(), "done".to_string());
        server.send(&reply).expect("reply should succeed");
        let back: BTreeMap<String, String> = client.receive().expect("reply should arrive");
        assert_eq!(back, reply);
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn malformed_line_fails_once_then_session_recovers() {
        let ns = make_namespace("garbage");
        let listener = PipeListener::bind_in(&ns, "garbage").expect("listener should bind");

        let ns_clone = ns.clone();
        let writer = thread::spawn(move || {
            let mut raw = linepipe_transport::connect(
                &ns_clone,
                "garbage",
                ".",
                ImpersonationLevel::MAXIMUM,
            )
            .expect("raw connect should succeed");
            raw.write_all(b"@@not-a-token@@\n").expect("raw write should succeed");
            let token = linepipe_frame::encode(&42).expect("encode should succeed");
            raw.write_all(format!("{token}\r\n").as_bytes())
                .expect("raw write should succeed");
            raw
        });

        let mut server = listener.accept().expect("listener should accept");
        let err = server.receive_value().expect_err("garbage should not decode");
        assert!(matches!(err, PipeError::Decode(_)));
        let next: i32 = server.receive().expect("next line should decode");
        assert_eq!(next, 42);

        drop(writer.join().expect("writer thread should finish"));
        let err = server.receive_value().expect_err("peer is gone");
        assert!(matches!(err, PipeError::ConnectionClosed));
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn unserializable_value_is_rejected_without_writing() {
        let ns = make_namespace("unser");
        let (mut server, mut client) = connected_pair(&ns, "unser");

        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], "byte-vector key");
        let err = client.send(&bad).expect_err("send should fail");
        assert!(matches!(err, PipeError::Serialization(_)));

        client.send(&"still fine").expect("session should stay usable");
        let got: String = server.receive().expect("receive should succeed");
        assert_eq!(got, "still fine");
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn registry_tracks_session_lifetime() {
        let ns = make_namespace("registry");
        assert!(!pipe_exists_in(&ns, "live").expect("listing should succeed"));

        let listener = PipeListener::bind_in(&ns, "live").expect("listener should bind");
        assert!(pipe_exists_in(&ns, "live").expect("listing should succeed"));

        let cfg = DialConfig::default().with_namespace(ns.clone());
        let dialer = thread::spawn(move || dial_with_config("live", &cfg).expect("dial should connect"));
        let mut server = listener.accept().expect("listener should accept");
        let mut client = dialer.join().expect("dialer thread should finish");
        assert!(pipe_exists_in(&ns, "live").expect("listing should succeed"));

        client.close().expect("client close should succeed");
        server.close().expect("server close should succeed");
        assert!(!pipe_exists_in(&ns, "live").expect("listing should succeed"));
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn dropping_listener_session_releases_name() {
        let ns = make_namespace("dropname");
        let (server, _client) = connected_pair(&ns, "scoped");
        assert!(pipe_exists_in(&ns, "scoped").expect("listing should succeed"));
        drop(server);
        assert!(!pipe_exists_in(&ns, "scoped").expect("listing should succeed"));

        // The name is free again.
        let _again = PipeListener::bind_in(&ns, "scoped").expect("rebind should succeed");
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn closed_session_rejects_operations() {
        let ns = make_namespace("closed");
        let (mut server, mut client) = connected_pair(&ns, "closed");

        client.close().expect("close should succeed");
        assert!(client.is_closed());
        client.close().expect("second close should be a no-op");

        assert!(matches!(
            client.receive_value().unwrap_err(),
            PipeError::AlreadyClosed
        ));
        assert!(matches!(
            client.send(&1).unwrap_err(),
            PipeError::AlreadyClosed
        ));
        assert!(matches!(
            client.abort_handle().unwrap_err(),
            PipeError::AlreadyClosed
        ));

        // The other end sees the close as end of stream.
        assert!(matches!(
            server.receive_value().unwrap_err(),
            PipeError::ConnectionClosed
        ));
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn abort_unblocks_pending_receive() {
        let ns = make_namespace("abort");
        let (mut server, _client) = connected_pair(&ns, "abort");
        let abort = server.abort_handle().expect("abort handle should be available");

        let blocked = thread::spawn(move || server.receive_value());
        thread::sleep(Duration::from_millis(50));
        abort.abort().expect("abort should succeed");

        let result = blocked.join().expect("receiver thread should finish");
        assert!(matches!(result, Err(PipeError::ConnectionClosed)));
        abort.abort().expect("second abort should be harmless");
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[test]
    fn read_timeout_surfaces_as_io() {
        let ns = make_namespace("timeout");
        let listener = PipeListener::bind_in(&ns, "slow")
            .expect("listener should bind")
            .with_session_config(SessionConfig {
                read_timeout: Some(Duration::from_millis(20)),
                write_timeout: None,
            });
        let cfg = DialConfig::default().with_namespace(ns.clone());
        let dialer = thread::spawn(move || dial_with_config("slow", &cfg).expect("dial should connect"));
        let mut server = listener.accept().expect("listener should accept");
        let _client = dialer.join().expect("dialer thread should finish");

        assert!(matches!(
            server.receive_value().unwrap_err(),
            PipeError::Io(_)
        ));
        let _ = std::fs::remove_dir_all(ns.root());
    }
}
