use std::fs::{File, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::impersonation::ImpersonationLevel;
use crate::namespace::{is_local_host, PipeNamespace};
use crate::stream::PipeStream;

/// Default permission mode for created endpoint sockets.
pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
/// Permission mode for a namespace root this crate creates.
pub const DEFAULT_ROOT_MODE: u32 = 0o700;

/// Directory under the namespace root holding one lock file per endpoint.
///
/// A live endpoint holds an exclusive `flock` on its lock file. A socket whose
/// lock is free was left behind by a process that died without cleaning up.
pub const LOCK_DIR: &str = ".locks";

const LOCK_ATTEMPTS: usize = 3;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// A bound, not yet connected, pipe endpoint backed by a Unix domain socket.
///
/// The endpoint is visible in the namespace from `bind` until the
/// [`EndpointGuard`] returned by `accept` (or the server itself) is dropped.
pub struct PipeServer {
    listener: UnixListener,
    name: String,
    guard: EndpointGuard,
}

impl PipeServer {
    /// Create the endpoint `name` inside `namespace`.
    ///
    /// Fails with `AddrInUse` while another endpoint owns the name, including
    /// one whose listener has already accepted its peer. A socket left by a
    /// dead process is removed and the name reused.
    pub fn bind(namespace: &PipeNamespace, name: &str) -> Result<Self> {
        let (path, lock) = prepare_endpoint(namespace, name)?;

        let listener = UnixListener::bind(&path).map_err(|e| bind_error(name, &path, e))?;
        let guard = finish_bind(name, &path, lock)?;

        info!(pipe = %name, ?path, "pipe endpoint created");

        Ok(Self {
            listener,
            name: name.to_string(),
            guard,
        })
    }

    /// Block until one peer connects, then stop listening.
    ///
    /// The listening socket is closed so later dialers are refused, while the
    /// returned guard keeps the name registered until it is dropped.
    pub fn accept(self) -> Result<(PipeStream, EndpointGuard)> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(pipe = %self.name, "accepted pipe connection");
        Ok((PipeStream::from_unix(stream), self.guard))
    }

    /// Logical endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS path this endpoint is bound to.
    pub fn path(&self) -> &Path {
        self.guard.path()
    }

    /// Removal handle for this endpoint's socket.
    pub fn cleanup(&self) -> EndpointCleanup {
        self.guard.cleanup()
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

/// Connect to the endpoint `name` (blocking).
///
/// Unix domain sockets are host-local; any remote `host` is rejected.
pub fn connect(
    namespace: &PipeNamespace,
    name: &str,
    host: &str,
    level: ImpersonationLevel,
) -> Result<PipeStream> {
    if !is_local_host(host) {
        return Err(TransportError::Unsupported(format!(
            "remote pipe host {host:?} (unix domain sockets are host-local)"
        )));
    }
    let path = namespace.endpoint_path(name)?;
    debug!(pipe = %name, %level, "impersonation level not applicable to unix domain sockets");

    let stream = UnixStream::connect(&path).map_err(|e| connect_error(name, host, e))?;
    debug!(pipe = %name, ?path, "connected to pipe endpoint");
    Ok(PipeStream::from_unix(stream))
}

/// Keeps an endpoint's namespace entry alive; removes it on drop.
///
/// Removal only happens if the path still refers to the socket this process
/// created, so a name re-bound by someone else is left alone. The endpoint
/// lock is released after the socket is gone.
#[derive(Debug)]
pub struct EndpointGuard {
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    _lock: EndpointLock,
}

impl EndpointGuard {
    /// OS path of the guarded endpoint.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A handle that removes the socket from another thread, with the same
    /// identity check the guard applies on drop.
    pub fn cleanup(&self) -> EndpointCleanup {
        EndpointCleanup {
            path: self.path.clone(),
            created_inode: self.created_inode,
        }
    }
}

impl Drop for EndpointGuard {
    fn drop(&mut self) {
        remove_socket_if_created(&self.path, self.created_inode);
    }
}

/// Identity-checked removal of an endpoint socket, detached from its guard.
///
/// Meant for signal handlers that exit the process while the guard is still
/// alive. The lock stays with the guard and is released when the process
/// exits.
#[derive(Debug, Clone)]
pub struct EndpointCleanup {
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl EndpointCleanup {
    /// Remove the socket if the path still refers to the one this process
    /// created.
    pub fn remove(&self) {
        remove_socket_if_created(&self.path, self.created_inode);
    }
}

fn remove_socket_if_created(path: &Path, created_inode: Option<(u64, u64)>) {
    let Some((expected_dev, expected_ino)) = created_inode else {
        return;
    };
    if let Ok(metadata) = std::fs::symlink_metadata(path) {
        if metadata.file_type().is_socket()
            && metadata.dev() == expected_dev
            && metadata.ino() == expected_ino
        {
            debug!(?path, "removing endpoint socket");
            let _ = std::fs::remove_file(path);
        } else {
            debug!(?path, "endpoint path identity changed; skipping cleanup");
        }
    }
}

/// Exclusive `flock` on `<root>/.locks/<name>`, held for the endpoint's
/// lifetime. The kernel drops it when the process dies.
#[derive(Debug)]
pub(crate) struct EndpointLock {
    file: File,
    path: PathBuf,
}

impl EndpointLock {
    fn acquire(namespace: &PipeNamespace, name: &str, endpoint: &Path) -> Result<Self> {
        let dir = namespace.root().join(LOCK_DIR);
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(DEFAULT_ROOT_MODE)
            .create(&dir)
            .map_err(|e| bind_error(name, endpoint, e))?;
        let path = dir.join(name);

        for attempt in 1..=LOCK_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .mode(DEFAULT_SOCKET_MODE)
                .open(&path)
                .map_err(|e| bind_error(name, endpoint, e))?;
            let locked =
                try_flock(&file, libc::LOCK_EX).map_err(|e| bind_error(name, endpoint, e))?;
            // A lock on a file its previous owner already unlinked guards nothing.
            if locked && same_file(&file, &path) {
                return Ok(Self { file, path });
            }
            if attempt < LOCK_ATTEMPTS {
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
        }

        Err(bind_error(
            name,
            endpoint,
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "pipe name already in use"),
        ))
    }
}

impl Drop for EndpointLock {
    fn drop(&mut self) {
        // Unlink while the lock is still held, and only if the path is still ours.
        if same_file(&self.file, &self.path) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Whether a live process owns the endpoint `name`.
///
/// Tries a shared lock, which is only granted while nobody holds the
/// exclusive one. Unreadable lock files count as live.
pub(crate) fn endpoint_is_live(namespace: &PipeNamespace, name: &str) -> bool {
    let file = match File::open(namespace.root().join(LOCK_DIR).join(name)) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return false,
        Err(_) => return true,
    };
    !matches!(try_flock(&file, libc::LOCK_SH), Ok(true))
}

fn try_flock(file: &File, operation: libc::c_int) -> std::io::Result<bool> {
    // SAFETY: `file` keeps its descriptor open for the duration of the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), operation | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

fn same_file(file: &File, path: &Path) -> bool {
    match (file.metadata(), std::fs::symlink_metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

/// Validate `name`, make sure the namespace root exists, take the endpoint
/// lock and clear a stale socket. Shared by the blocking and async listeners.
pub(crate) fn prepare_endpoint(
    namespace: &PipeNamespace,
    name: &str,
) -> Result<(PathBuf, EndpointLock)> {
    let path = namespace.endpoint_path(name)?;
    if name == LOCK_DIR {
        return Err(TransportError::InvalidName {
            name: name.to_string(),
            reason: "name is reserved for endpoint locks",
        });
    }

    let path_bytes = path.as_os_str().len();
    if path_bytes >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path,
            len: path_bytes,
            max: MAX_PATH_LEN,
        });
    }

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(DEFAULT_ROOT_MODE)
        .create(namespace.root())
        .map_err(|e| bind_error(name, &path, e))?;

    let lock = EndpointLock::acquire(namespace, name, &path)?;

    // With the lock held, any socket still at the path has no live owner.
    match std::fs::symlink_metadata(&path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!(?path, "removing stale endpoint socket");
            std::fs::remove_file(&path).map_err(|e| bind_error(name, &path, e))?;
        }
        Ok(_) => {
            return Err(bind_error(
                name,
                &path,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a pipe endpoint",
                ),
            ));
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(bind_error(name, &path, err)),
    }

    Ok((path, lock))
}

/// Harden permissions on a freshly bound socket and record its identity.
pub(crate) fn finish_bind(name: &str, path: &Path, lock: EndpointLock) -> Result<EndpointGuard> {
    // Identity is recorded first so a permissions failure still removes the socket.
    let mut guard = EndpointGuard {
        path: path.to_path_buf(),
        created_inode: None,
        _lock: lock,
    };

    let metadata = std::fs::symlink_metadata(path).map_err(|e| bind_error(name, path, e))?;
    guard.created_inode = Some((metadata.dev(), metadata.ino()));

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(DEFAULT_SOCKET_MODE))
        .map_err(|e| bind_error(name, path, e))?;

    Ok(guard)
}

pub(crate) fn bind_error(name: &str, path: &Path, source: std::io::Error) -> TransportError {
    TransportError::Bind {
        name: name.to_string(),
        path: path.to_path_buf(),
        source,
    }
}

pub(crate) fn connect_error(name: &str, host: &str, source: std::io::Error) -> TransportError {
    TransportError::Connect {
        name: name.to_string(),
        host: host.to_string(),
        source,
    }
}
