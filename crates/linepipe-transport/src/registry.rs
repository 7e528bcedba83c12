//! Point-in-time listing of the endpoints open in a pipe namespace.
//!
//! Every call reads live OS state. Nothing is cached, and a listing says
//! nothing about what happens after it returns. On Unix a socket only counts
//! while its owning process still holds the endpoint lock, so sockets left
//! by crashed listeners are not reported.

use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::namespace::PipeNamespace;

/// One endpoint currently present in the namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeEntry {
    /// Logical name with the namespace root stripped.
    pub name: String,
    /// Raw OS path of the endpoint.
    pub path: PathBuf,
}

/// List every endpoint in the default namespace.
pub fn list_pipes() -> Result<Vec<PipeEntry>> {
    list_pipes_in(&PipeNamespace::default())
}

/// List every endpoint in `namespace`, sorted by name.
pub fn list_pipes_in(namespace: &PipeNamespace) -> Result<Vec<PipeEntry>> {
    let entries = match std::fs::read_dir(namespace.root()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(root = ?namespace.root(), "namespace root missing; no pipes");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };

    let mut pipes = Vec::new();
    for entry in entries {
        // Entries can vanish between readdir and inspection.
        let Ok(entry) = entry else { continue };
        if !is_endpoint(&entry) {
            continue;
        }
        let path = entry.path();
        let Some(name) = namespace.strip_root(&path) else {
            continue;
        };
        if !is_live(namespace, &name) {
            debug!(pipe = %name, "skipping endpoint with no live owner");
            continue;
        }
        pipes.push(PipeEntry { name, path });
    }
    pipes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(pipes)
}

/// Whether an endpoint called `name` is present in the default namespace.
///
/// Best effort: the answer can be stale by the time the caller acts on it.
pub fn pipe_exists(name: &str) -> Result<bool> {
    pipe_exists_in(&PipeNamespace::default(), name)
}

/// Whether an endpoint called `name` is present in `namespace`.
pub fn pipe_exists_in(namespace: &PipeNamespace, name: &str) -> Result<bool> {
    Ok(list_pipes_in(namespace)?
        .iter()
        .any(|entry| entry.name == name))
}

#[cfg(unix)]
fn is_endpoint(entry: &std::fs::DirEntry) -> bool {
    use std::os::unix::fs::FileTypeExt;

    entry
        .file_type()
        .map(|file_type| file_type.is_socket())
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_live(namespace: &PipeNamespace, name: &str) -> bool {
    crate::unix::endpoint_is_live(namespace, name)
}

// Everything under the pipe filesystem root is a pipe, and pipes vanish with
// their last handle.
#[cfg(windows)]
fn is_endpoint(_entry: &std::fs::DirEntry) -> bool {
    true
}

#[cfg(windows)]
fn is_live(_namespace: &PipeNamespace, _name: &str) -> bool {
    true
}
