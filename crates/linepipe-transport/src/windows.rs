use std::ffi::OsStr;
use std::fs::File;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use windows_sys::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_NOT_FOUND, ERROR_PIPE_BUSY, ERROR_PIPE_CONNECTED, GENERIC_READ,
    GENERIC_WRITE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAG_FIRST_PIPE_INSTANCE, OPEN_EXISTING, PIPE_ACCESS_DUPLEX,
};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE, PIPE_WAIT,
};
use windows_sys::Win32::System::IO::CancelIoEx;

use crate::error::{Result, TransportError};
use crate::impersonation::ImpersonationLevel;
use crate::namespace::PipeNamespace;
use crate::stream::PipeStream;

const PIPE_BUFFER_SIZE: u32 = 64 * 1024;

/// Raw OS code for "all pipe instances are busy".
pub const PIPE_BUSY_CODE: i32 = ERROR_PIPE_BUSY as i32;

/// A created, not yet connected, single-instance named pipe.
pub struct PipeServer {
    handle: OwnedHandle,
    name: String,
    guard: EndpointGuard,
}

impl PipeServer {
    /// Create the pipe `name` inside `namespace`.
    ///
    /// The pipe allows exactly one instance; creating a name that already
    /// exists fails with `AddrInUse`.
    pub fn bind(namespace: &PipeNamespace, name: &str) -> Result<Self> {
        let path = namespace.endpoint_path(name)?;
        let wide = to_wide(path.as_os_str());

        // SAFETY: `wide` is a NUL-terminated UTF-16 buffer that outlives the call;
        // a null security-attributes pointer selects the default descriptor.
        let raw = unsafe {
            CreateNamedPipeW(
                wide.as_ptr(),
                PIPE_ACCESS_DUPLEX | FILE_FLAG_FIRST_PIPE_INSTANCE,
                PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
                1,
                PIPE_BUFFER_SIZE,
                PIPE_BUFFER_SIZE,
                0,
                std::ptr::null(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            let err = std::io::Error::last_os_error();
            // FIRST_PIPE_INSTANCE reports an existing name as access denied.
            let err = if err.raw_os_error() == Some(ERROR_ACCESS_DENIED as i32)
                && crate::registry::pipe_exists_in(namespace, name).unwrap_or(false)
            {
                std::io::Error::new(std::io::ErrorKind::AddrInUse, "pipe name already in use")
            } else {
                err
            };
            return Err(bind_error(name, &path, err));
        }

        // SAFETY: `raw` is a valid pipe handle just returned by CreateNamedPipeW
        // and owned by nothing else.
        let handle = unsafe { OwnedHandle::from_raw_handle(raw as _) };
        info!(pipe = %name, ?path, "pipe endpoint created");

        Ok(Self {
            handle,
            name: name.to_string(),
            guard: EndpointGuard::new(path),
        })
    }

    /// Block until one client connects to the pipe.
    pub fn accept(self) -> Result<(PipeStream, EndpointGuard)> {
        // SAFETY: the handle is a valid server pipe handle owned by `self`;
        // a null OVERLAPPED pointer requests a synchronous wait.
        let ok = unsafe { ConnectNamedPipe(self.handle.as_raw_handle() as _, std::ptr::null_mut()) };
        if ok == 0 {
            let err = std::io::Error::last_os_error();
            // A client that connected between create and connect is fine.
            if err.raw_os_error() != Some(ERROR_PIPE_CONNECTED as i32) {
                return Err(TransportError::Accept(err));
            }
        }
        debug!(pipe = %self.name, "accepted pipe connection");
        Ok((PipeStream::from_windows(File::from(self.handle)), self.guard))
    }

    /// Logical endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS path of this pipe.
    pub fn path(&self) -> &Path {
        self.guard.path()
    }

    /// Removal handle for this pipe.
    pub fn cleanup(&self) -> EndpointCleanup {
        self.guard.cleanup()
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "named-pipe"
    }
}

/// Connect to the pipe `name` on `host` (blocking).
///
/// The client grants the server `level` impersonation rights.
pub fn connect(
    namespace: &PipeNamespace,
    name: &str,
    host: &str,
    level: ImpersonationLevel,
) -> Result<PipeStream> {
    let path = namespace.host_path(name, host)?;
    let wide = to_wide(path.as_os_str());

    // SAFETY: `wide` is NUL-terminated and outlives the call; null security
    // attributes and template handle are permitted for OPEN_EXISTING.
    let raw = unsafe {
        CreateFileW(
            wide.as_ptr(),
            GENERIC_READ | GENERIC_WRITE,
            0,
            std::ptr::null(),
            OPEN_EXISTING,
            level.sqos_flags(),
            std::ptr::null_mut(),
        )
    };
    if raw == INVALID_HANDLE_VALUE {
        return Err(connect_error(name, host, std::io::Error::last_os_error()));
    }

    // SAFETY: `raw` is a valid file handle just returned by CreateFileW.
    let handle = unsafe { OwnedHandle::from_raw_handle(raw as _) };
    debug!(pipe = %name, host, %level, ?path, "connected to named pipe");
    Ok(PipeStream::from_windows(File::from(handle)))
}

/// Cancel any blocking I/O in flight on `pipe`, from any thread.
pub(crate) fn cancel_pending_io(pipe: &File) -> Result<()> {
    // SAFETY: the handle is valid for the lifetime of `pipe`; a null
    // OVERLAPPED pointer cancels every request issued for the handle.
    let ok = unsafe { CancelIoEx(pipe.as_raw_handle() as _, std::ptr::null()) };
    if ok == 0 {
        let err = std::io::Error::last_os_error();
        // Nothing was pending.
        if err.raw_os_error() != Some(ERROR_NOT_FOUND as i32) {
            return Err(err.into());
        }
    }
    Ok(())
}

/// Names a created pipe. Windows removes the pipe once every handle closes,
/// so the guard only carries the path.
#[derive(Debug)]
pub struct EndpointGuard {
    path: PathBuf,
}

impl EndpointGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// OS path of the guarded endpoint.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cleanup(&self) -> EndpointCleanup {
        EndpointCleanup
    }
}

/// Named pipes disappear with their last handle, which process exit closes.
#[derive(Debug, Clone)]
pub struct EndpointCleanup;

impl EndpointCleanup {
    pub fn remove(&self) {}
}

fn to_wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}

fn bind_error(name: &str, path: &Path, source: std::io::Error) -> TransportError {
    TransportError::Bind {
        name: name.to_string(),
        path: path.to_path_buf(),
        source,
    }
}

fn connect_error(name: &str, host: &str, source: std::io::Error) -> TransportError {
    TransportError::Connect {
        name: name.to_string(),
        host: host.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn unique_name(tag: &str) -> String {
        format!(
            "lpt-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        )
    }

    #[test]
    fn test_bind_accept_connect() {
        let ns = PipeNamespace::default();
        let name = unique_name("bac");
        let server = PipeServer::bind(&ns, &name).unwrap();

        let name_clone = name.clone();
        let handle = std::thread::spawn(move || {
            let mut client = connect(
                &PipeNamespace::default(),
                &name_clone,
                ".",
                ImpersonationLevel::MAXIMUM,
            )
            .unwrap();
            client.write_all(b"hello").unwrap();
        });

        let (mut stream, _guard) = server.accept().unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        handle.join().unwrap();
    }

    #[test]
    fn test_bind_rejects_name_in_use() {
        let ns = PipeNamespace::default();
        let name = unique_name("inuse");
        let _server = PipeServer::bind(&ns, &name).unwrap();
        let err = PipeServer::bind(&ns, &name).err().unwrap();
        assert!(matches!(err, TransportError::Bind { .. }));
    }
}
