//! Tokio counterparts of [`PipeListener`](crate::PipeListener) and
//! [`Session`](crate::Session).
//!
//! Each blocking call becomes a suspension point with the same completion
//! contract. `receive` and `accept` futures may be dropped before they
//! complete without losing data or the endpoint. A dropped `send` future may
//! have written part of its line, so the session should be closed after one.

use std::path::Path;

use futures_util::{SinkExt, StreamExt};
use linepipe_frame::{decode, encode, TokenLineCodec};
use linepipe_transport::{
    connect_async, AsyncPipeServer, AsyncPipeStream, EndpointGuard, PipeNamespace,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::DialConfig;
use crate::error::{PipeError, Result};
use crate::session::Role;

/// A bound async endpoint that accepts exactly one peer.
pub struct AsyncPipeListener {
    server: AsyncPipeServer,
}

impl AsyncPipeListener {
    /// Bind `name` in the default namespace.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(name: &str) -> Result<Self> {
        Self::bind_in(&PipeNamespace::default(), name)
    }

    /// Bind `name` in `namespace`.
    pub fn bind_in(namespace: &PipeNamespace, name: &str) -> Result<Self> {
        let server = AsyncPipeServer::bind(namespace, name)
            .map_err(|e| PipeError::from_transport(name, e))?;
        Ok(Self { server })
    }

    /// Wait for one peer to connect.
    pub async fn accept(self) -> Result<AsyncSession> {
        let name = self.server.name().to_string();
        info!(pipe = %name, "waiting for peer");
        let (stream, guard) = self
            .server
            .accept()
            .await
            .map_err(|e| PipeError::from_transport(&name, e))?;
        Ok(AsyncSession::from_stream(&name, Role::Listener, stream, Some(guard)))
    }

    /// Like [`accept`](AsyncPipeListener::accept), but gives up with
    /// [`PipeError::Cancelled`] once `token` fires. The endpoint is released
    /// on cancellation.
    pub async fn accept_until(self, token: &CancellationToken) -> Result<AsyncSession> {
        let name = self.server.name().to_string();
        tokio::select! {
            biased;

            () = token.cancelled() => {
                debug!(pipe = %name, "accept cancelled");
                Err(PipeError::Cancelled)
            }

            session = self.accept() => session,
        }
    }

    /// Logical pipe name.
    pub fn name(&self) -> &str {
        self.server.name()
    }

    /// OS path of the bound endpoint.
    pub fn path(&self) -> &Path {
        self.server.path()
    }
}

/// Async session exchanging one serde value per line.
pub struct AsyncSession {
    name: String,
    role: Role,
    state: Option<AsyncConnected>,
}

struct AsyncConnected {
    reader: FramedRead<ReadHalf<AsyncPipeStream>, TokenLineCodec>,
    writer: FramedWrite<WriteHalf<AsyncPipeStream>, TokenLineCodec>,
    _guard: Option<EndpointGuard>,
}

impl AsyncSession {
    fn from_stream(
        name: &str,
        role: Role,
        stream: AsyncPipeStream,
        guard: Option<EndpointGuard>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        debug!(pipe = %name, role = role.as_str(), "async session established");
        Self {
            name: name.to_string(),
            role,
            state: Some(AsyncConnected {
                reader: FramedRead::new(read_half, TokenLineCodec::new()),
                writer: FramedWrite::new(write_half, TokenLineCodec::new()),
                _guard: guard,
            }),
        }
    }

    /// Encode `value` and write it as one flushed line.
    pub async fn send<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let state = self.state.as_mut().ok_or(PipeError::AlreadyClosed)?;
        let token = encode(value).map_err(PipeError::Serialization)?;
        let bytes = token.len() + 1;
        state.writer.send(token).await?;
        trace!(pipe = %self.name, bytes, "sent message");
        Ok(())
    }

    /// Wait for the next line and decode it as `T`.
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<T> {
        let state = self.state.as_mut().ok_or(PipeError::AlreadyClosed)?;
        let line = match state.reader.next().await {
            Some(line) => line?,
            None => return Err(PipeError::ConnectionClosed),
        };
        trace!(pipe = %self.name, bytes = line.len(), "received line");
        decode(&line).map_err(|err| {
            debug!(pipe = %self.name, error = %err, "discarding undecodable message");
            PipeError::Decode(err)
        })
    }

    /// [`receive`](AsyncSession::receive) into an untyped JSON value.
    pub async fn receive_value(&mut self) -> Result<serde_json::Value> {
        self.receive().await
    }

    /// Flush, shut down the write side and release the stream. Closing
    /// twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        let result = match state.writer.close().await.map_err(PipeError::from) {
            Err(PipeError::ConnectionClosed) => Ok(()),
            Err(PipeError::Io(err)) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other,
        };
        drop(state);
        debug!(pipe = %self.name, role = self.role.as_str(), "async session closed");
        result
    }

    /// Logical pipe name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }
}

impl std::fmt::Debug for AsyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSession")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Bind `name` in the default namespace and wait for one peer.
pub async fn listen_async(name: &str) -> Result<AsyncSession> {
    AsyncPipeListener::bind(name)?.accept().await
}

/// Connect to `name` on the local host in the default namespace.
pub async fn dial_async(name: &str) -> Result<AsyncSession> {
    dial_async_with_config(name, &DialConfig::default()).await
}

/// Connect with explicit configuration. Session timeouts are not applied;
/// wrap calls in `tokio::time::timeout` instead.
pub async fn dial_async_with_config(name: &str, config: &DialConfig) -> Result<AsyncSession> {
    let stream = connect_async(&config.namespace, name, &config.host, config.impersonation)
        .await
        .map_err(|e| PipeError::from_transport(name, e))?;
    info!(pipe = %name, host = %config.host, impersonation = %config.impersonation, "dialed pipe");
    Ok(AsyncSession::from_stream(name, Role::Dialer, stream, None))
}
