use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::path::Path;
use std::ptr;

use windows_sys::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_PIPE_BUSY, ERROR_PIPE_CONNECTED,
    GENERIC_READ, GENERIC_WRITE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FlushFileBuffers, FILE_FLAG_FIRST_PIPE_INSTANCE, OPEN_EXISTING,
    PIPE_ACCESS_DUPLEX,
};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE,
    PIPE_WAIT,
};

use crate::endpoint::Direction;
use crate::error::{Result, TransportError};

/// Default client wait timeout baked into the pipe, in milliseconds.
const DEFAULT_TIMEOUT_MS: u32 = 300;

fn wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(once(0)).collect()
}

/// Create the server side of a named pipe.
///
/// The pipe is duplex, byte-oriented, blocking and single-instance. With
/// `FILE_FLAG_FIRST_PIPE_INSTANCE`, an existing identity fails instead of
/// silently adding another instance.
pub(crate) fn create_server(path: &Path, buffer_size: u32) -> Result<OwnedHandle> {
    let name = wide(path.as_os_str());

    // SAFETY: `name` is a NUL-terminated UTF-16 string alive for the call;
    // a null security-attributes pointer selects the default descriptor.
    let handle = unsafe {
        CreateNamedPipeW(
            name.as_ptr(),
            PIPE_ACCESS_DUPLEX | FILE_FLAG_FIRST_PIPE_INSTANCE,
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
            1,
            buffer_size,
            buffer_size,
            DEFAULT_TIMEOUT_MS,
            ptr::null(),
        )
    };

    if handle == INVALID_HANDLE_VALUE {
        let err = io::Error::last_os_error();
        return Err(match err.raw_os_error() {
            Some(code) if code == ERROR_ACCESS_DENIED as i32 || code == ERROR_PIPE_BUSY as i32 => {
                TransportError::Exists {
                    path: path.to_path_buf(),
                }
            }
            _ => TransportError::Io(err),
        });
    }

    // SAFETY: `handle` is a freshly created, valid pipe handle that we now own.
    Ok(unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) })
}

/// Wait for a client on the server handle and return a stream over it.
pub(crate) fn connect_server(server: &OwnedHandle) -> io::Result<File> {
    // SAFETY: `server` is a valid pipe handle; no OVERLAPPED structure is used.
    let ok = unsafe { ConnectNamedPipe(server.as_raw_handle() as _, ptr::null_mut()) } != 0;
    if !ok {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(ERROR_PIPE_CONNECTED as i32) {
            return Err(err);
        }
    }
    Ok(File::from(server.try_clone()?))
}

/// Drop the current client from the server handle.
pub(crate) fn disconnect_server(server: &OwnedHandle) -> io::Result<()> {
    // SAFETY: `server` is a valid pipe handle owned by the caller.
    let ok = unsafe { DisconnectNamedPipe(server.as_raw_handle() as _) } != 0;
    if ok {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Open the client side of an existing named pipe.
pub(crate) fn open_client(path: &Path, direction: Direction) -> io::Result<File> {
    let name = wide(path.as_os_str());
    let access = match direction {
        Direction::Read => GENERIC_READ,
        Direction::Write => GENERIC_WRITE,
    };

    // SAFETY: `name` is a NUL-terminated UTF-16 string alive for the call;
    // null security attributes and template handle are permitted.
    let handle = unsafe {
        CreateFileW(
            name.as_ptr(),
            access,
            0,
            ptr::null(),
            OPEN_EXISTING,
            0,
            ptr::null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `handle` is a valid handle returned by CreateFileW that we now own.
    Ok(unsafe { File::from_raw_handle(handle as RawHandle) })
}

/// Errors that mean "the other side is not there yet".
pub(crate) fn is_rendezvous_error(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == ERROR_FILE_NOT_FOUND as i32 || code == ERROR_PIPE_BUSY as i32
    )
}

/// Push written bytes through to the reader.
pub(crate) fn flush(file: &File) -> io::Result<()> {
    // SAFETY: `file` owns a valid handle for the duration of the call.
    let ok = unsafe { FlushFileBuffers(file.as_raw_handle() as _) } != 0;
    if ok {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
