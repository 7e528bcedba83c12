use linepipe_transport::connect;
use tracing::info;

use crate::config::DialConfig;
use crate::error::{PipeError, Result};
use crate::session::{Role, Session};

/// Connect to `name` on the local host in the default namespace.
///
/// Fails promptly with [`PipeError::EndpointUnavailable`] when nothing is
/// listening. Only dial endpoints you trust: the server may act with the
/// caller's identity up to the granted impersonation level.
pub fn dial(name: &str) -> Result<Session> {
    dial_with_config(name, &DialConfig::default())
}

/// Connect to `name` on `host` in the default namespace.
pub fn dial_host(name: &str, host: &str) -> Result<Session> {
    dial_with_config(name, &DialConfig::default().with_host(host))
}

/// Connect with explicit configuration.
pub fn dial_with_config(name: &str, config: &DialConfig) -> Result<Session> {
    let stream = connect(&config.namespace, name, &config.host, config.impersonation)
        .map_err(|e| PipeError::from_transport(name, e))?;

    info!(pipe = %name, host = %config.host, impersonation = %config.impersonation, "dialed pipe");
    Session::from_stream(name, Role::Dialer, stream, None, &config.session)
}
