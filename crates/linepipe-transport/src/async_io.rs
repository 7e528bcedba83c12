//! Tokio-backed endpoints with the same naming and lifecycle rules as the
//! blocking transport.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::impersonation::ImpersonationLevel;
use crate::namespace::PipeNamespace;

#[cfg(unix)]
use crate::unix::EndpointGuard;
#[cfg(windows)]
use crate::windows::EndpointGuard;

/// A connected async pipe stream.
pub struct AsyncPipeStream {
    inner: AsyncPipeStreamInner,
}

enum AsyncPipeStreamInner {
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    #[cfg(windows)]
    Server(tokio::net::windows::named_pipe::NamedPipeServer),
    #[cfg(windows)]
    Client(tokio::net::windows::named_pipe::NamedPipeClient),
}

impl AsyncRead for AsyncPipeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            AsyncPipeStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(windows)]
            AsyncPipeStreamInner::Server(pipe) => Pin::new(pipe).poll_read(cx, buf),
            #[cfg(windows)]
            AsyncPipeStreamInner::Client(pipe) => Pin::new(pipe).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for AsyncPipeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            AsyncPipeStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(windows)]
            AsyncPipeStreamInner::Server(pipe) => Pin::new(pipe).poll_write(cx, buf),
            #[cfg(windows)]
            AsyncPipeStreamInner::Client(pipe) => Pin::new(pipe).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            AsyncPipeStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(windows)]
            AsyncPipeStreamInner::Server(pipe) => Pin::new(pipe).poll_flush(cx),
            #[cfg(windows)]
            AsyncPipeStreamInner::Client(pipe) => Pin::new(pipe).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            AsyncPipeStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(windows)]
            AsyncPipeStreamInner::Server(pipe) => Pin::new(pipe).poll_shutdown(cx),
            #[cfg(windows)]
            AsyncPipeStreamInner::Client(pipe) => Pin::new(pipe).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for AsyncPipeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            #[cfg(unix)]
            AsyncPipeStreamInner::Unix(_) => "unix",
            #[cfg(windows)]
            AsyncPipeStreamInner::Server(_) => "named-pipe-server",
            #[cfg(windows)]
            AsyncPipeStreamInner::Client(_) => "named-pipe-client",
        };
        f.debug_struct("AsyncPipeStream").field("type", &kind).finish()
    }
}

/// A bound async endpoint waiting for its single peer.
pub struct AsyncPipeServer {
    #[cfg(unix)]
    listener: tokio::net::UnixListener,
    #[cfg(windows)]
    server: tokio::net::windows::named_pipe::NamedPipeServer,
    name: String,
    guard: EndpointGuard,
}

impl AsyncPipeServer {
    /// Create the endpoint `name` inside `namespace`.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn bind(namespace: &PipeNamespace, name: &str) -> Result<Self> {
        let (path, lock) = crate::unix::prepare_endpoint(namespace, name)?;
        let listener = tokio::net::UnixListener::bind(&path)
            .map_err(|e| crate::unix::bind_error(name, &path, e))?;
        let guard = crate::unix::finish_bind(name, &path, lock)?;

        info!(pipe = %name, ?path, "async pipe endpoint created");
        Ok(Self {
            listener,
            name: name.to_string(),
            guard,
        })
    }

    /// Create the pipe `name` inside `namespace`.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(windows)]
    pub fn bind(namespace: &PipeNamespace, name: &str) -> Result<Self> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let path = namespace.endpoint_path(name)?;
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .max_instances(1)
            .create(&path)
            .map_err(|source| TransportError::Bind {
                name: name.to_string(),
                path: path.clone(),
                source,
            })?;

        info!(pipe = %name, ?path, "async pipe endpoint created");
        Ok(Self {
            server,
            name: name.to_string(),
            guard: crate::windows::EndpointGuard::new(path),
        })
    }

    /// Wait for one peer to connect. Dropping the future abandons the wait
    /// and leaves the endpoint bound.
    pub async fn accept(self) -> Result<(AsyncPipeStream, EndpointGuard)> {
        #[cfg(unix)]
        let inner = {
            let (stream, _addr) = self.listener.accept().await.map_err(TransportError::Accept)?;
            AsyncPipeStreamInner::Unix(stream)
        };
        #[cfg(windows)]
        let inner = {
            self.server.connect().await.map_err(TransportError::Accept)?;
            AsyncPipeStreamInner::Server(self.server)
        };

        debug!(pipe = %self.name, "accepted async pipe connection");
        Ok((AsyncPipeStream { inner }, self.guard))
    }

    /// Logical endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS path this endpoint is bound to.
    pub fn path(&self) -> &std::path::Path {
        self.guard.path()
    }
}

/// Connect to the endpoint `name` on `host`.
#[cfg(unix)]
pub async fn connect_async(
    namespace: &PipeNamespace,
    name: &str,
    host: &str,
    level: ImpersonationLevel,
) -> Result<AsyncPipeStream> {
    if !crate::namespace::is_local_host(host) {
        return Err(TransportError::Unsupported(format!(
            "remote pipe host {host:?} (unix domain sockets are host-local)"
        )));
    }
    let path = namespace.endpoint_path(name)?;
    debug!(pipe = %name, %level, "impersonation level not applicable to unix domain sockets");

    let stream = tokio::net::UnixStream::connect(&path)
        .await
        .map_err(|e| crate::unix::connect_error(name, host, e))?;
    debug!(pipe = %name, ?path, "connected to async pipe endpoint");
    Ok(AsyncPipeStream {
        inner: AsyncPipeStreamInner::Unix(stream),
    })
}

/// Connect to the pipe `name` on `host`, granting `level` impersonation.
#[cfg(windows)]
pub async fn connect_async(
    namespace: &PipeNamespace,
    name: &str,
    host: &str,
    level: ImpersonationLevel,
) -> Result<AsyncPipeStream> {
    use tokio::net::windows::named_pipe::ClientOptions;

    let path = namespace.host_path(name, host)?;
    let client = ClientOptions::new()
        .security_qos_flags(level.sqos_flags())
        .open(&path)
        .map_err(|source| TransportError::Connect {
            name: name.to_string(),
            host: host.to_string(),
            source,
        })?;
    debug!(pipe = %name, host, %level, "connected to async named pipe");
    Ok(AsyncPipeStream {
        inner: AsyncPipeStreamInner::Client(client),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn make_namespace(tag: &str) -> PipeNamespace {
        PipeNamespace::new(format!(
            "/tmp/lpa-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[tokio::test]
    async fn bind_accept_connect() {
        let ns = make_namespace("bac");
        let server = AsyncPipeServer::bind(&ns, "async").unwrap();
        let path = server.path().to_path_buf();

        let ns_clone = ns.clone();
        let client = tokio::spawn(async move {
            let mut stream = connect_async(&ns_clone, "async", ".", ImpersonationLevel::MAXIMUM)
                .await
                .unwrap();
            stream.write_all(b"hello").await.unwrap();
        });

        let (mut stream, guard) = server.accept().await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        client.await.unwrap();

        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(ns.root());
    }

    #[tokio::test]
    async fn connect_missing_endpoint_fails() {
        let ns = make_namespace("missing");
        let err = connect_async(&ns, "nope", ".", ImpersonationLevel::MAXIMUM)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
