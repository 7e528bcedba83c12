//! Mapping between logical pipe names and OS endpoint paths.
//!
//! Callers only ever see short logical names such as `build-agent`. The
//! namespace adds the platform root when an endpoint is created or dialed and
//! strips it again when the registry lists what is open.

use std::path::{Path, PathBuf};

use crate::error::{Result, TransportError};

/// Root directory holding endpoint sockets on Unix.
#[cfg(unix)]
pub const DEFAULT_UNIX_ROOT: &str = "/tmp/linepipe";

/// Root of the Windows named pipe filesystem on the local machine.
#[cfg(windows)]
pub const WINDOWS_PIPE_ROOT: &str = r"\\.\pipe\";

/// Host identifier meaning "this machine".
pub const LOCAL_HOST: &str = ".";

const MAX_NAME_LEN: usize = 256;

/// A pipe namespace rooted at an OS-specific location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeNamespace {
    root: PathBuf,
}

impl Default for PipeNamespace {
    fn default() -> Self {
        #[cfg(unix)]
        let root = PathBuf::from(DEFAULT_UNIX_ROOT);
        #[cfg(windows)]
        let root = PathBuf::from(WINDOWS_PIPE_ROOT);
        Self { root }
    }
}

impl PipeNamespace {
    /// Use `root` as the namespace root instead of the platform default.
    ///
    /// On Unix this is a directory that will hold one socket per endpoint.
    /// On Windows it must be a pipe filesystem root such as `\\.\pipe\`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The namespace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full OS path for the endpoint called `name` on the local host.
    pub fn endpoint_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Full OS path for `name` on `host`.
    ///
    /// Local host identifiers resolve through [`PipeNamespace::endpoint_path`].
    /// Remote hosts use the UNC pipe form `\\host\pipe\name`.
    pub fn host_path(&self, name: &str, host: &str) -> Result<PathBuf> {
        if is_local_host(host) {
            return self.endpoint_path(name);
        }
        validate_name(name)?;
        validate_host(host)?;
        Ok(PathBuf::from(format!(r"\\{host}\pipe\{name}")))
    }

    /// Strip the namespace root from a raw OS path, yielding the logical name.
    ///
    /// Returns `None` for paths outside this namespace or with non-UTF-8 names.
    pub fn strip_root(&self, path: &Path) -> Option<String> {
        let rest = path.strip_prefix(&self.root).ok()?;
        let name = rest.to_str()?;
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// Check that `name` can be used as a single endpoint name.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("name must be at most 256 bytes")
    } else if name == "." || name == ".." {
        Some("name must not be a relative path component")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name must not contain path separators or NUL")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(TransportError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Whether `host` refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    let host = host.trim();
    host.is_empty()
        || host == LOCAL_HOST
        || host.eq_ignore_ascii_case("local")
        || host.eq_ignore_ascii_case("localhost")
}

fn validate_host(host: &str) -> Result<()> {
    if host.contains(['/', '\\', '\0']) || host.chars().any(char::is_whitespace) {
        return Err(TransportError::InvalidName {
            name: host.to_string(),
            reason: "host must be a bare machine name",
        });
    }
    Ok(())
}
