use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use tracing::warn;

use crate::endpoint::Direction;
use crate::error::{Result, TransportError};

/// Filesystem identity `(dev, ino)` of a created FIFO.
pub(crate) type FifoId = (u64, u64);

/// Create a FIFO at `path` with permission bits `mode`.
pub(crate) fn create_fifo(path: &Path, mode: u32) -> Result<FifoId> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        TransportError::InvalidName {
            name: path.to_string_lossy().into_owned(),
            reason: "name contains a NUL byte",
        }
    })?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        return Err(match err.kind() {
            io::ErrorKind::AlreadyExists => TransportError::Exists {
                path: path.to_path_buf(),
            },
            _ => TransportError::Io(err),
        });
    }

    // mkfifo honours the umask; apply the requested mode exactly.
    unlink_on_error(path, |path| {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        let metadata = std::fs::symlink_metadata(path)?;
        Ok((metadata.dev(), metadata.ino()))
    })
}

/// Run the post-creation `step`; if it fails the fresh FIFO is unlinked.
fn unlink_on_error(
    path: &Path,
    step: impl FnOnce(&Path) -> io::Result<FifoId>,
) -> Result<FifoId> {
    step(path).map_err(|err| {
        if let Err(cleanup) = std::fs::remove_file(path) {
            warn!(
                path = %path.display(),
                error = %cleanup,
                "failed to remove fifo after setup error"
            );
        }
        TransportError::Io(err)
    })
}

/// Unlink the FIFO at `path`, refusing to touch anything that is not a FIFO.
pub(crate) fn remove_fifo(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(TransportError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(TransportError::Io(err)),
    };
    if !metadata.file_type().is_fifo() {
        return Err(TransportError::NotAPipe {
            path: path.to_path_buf(),
        });
    }
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(TransportError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(TransportError::Io(err)),
    }
}

/// Whether `path` is still the FIFO identified by `id`.
pub(crate) fn is_same_fifo(path: &Path, id: FifoId) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_fifo() && (m.dev(), m.ino()) == id)
        .unwrap_or(false)
}

/// Whether `path` currently names a FIFO.
pub(crate) fn fifo_exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_fifo())
        .unwrap_or(false)
}

/// Open one end of the FIFO.
///
/// The read end blocks in `open(2)` until a writer arrives. The write end is
/// opened non-blocking so that a missing reader surfaces as `ENXIO` instead of
/// hanging, then switched back to blocking mode.
pub(crate) fn open_end(path: &Path, direction: Direction) -> io::Result<File> {
    let file = match direction {
        Direction::Read => OpenOptions::new().read(true).open(path)?,
        Direction::Write => {
            let file = OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)?;
            set_blocking(&file)?;
            file
        }
    };
    Ok(file)
}

/// Whether the opened handle refers to a FIFO.
pub(crate) fn is_fifo(file: &File) -> io::Result<bool> {
    Ok(file.metadata()?.file_type().is_fifo())
}

/// Errors that mean "the other side is not there yet".
pub(crate) fn is_rendezvous_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ENXIO)
}

/// Kernel pipes have no user-space buffer; writes are visible immediately.
pub(crate) fn flush(_file: &File) -> io::Result<()> {
    Ok(())
}

fn set_blocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: `fd` is an open descriptor owned by `file` for the duration of the call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: same descriptor as above; only the O_NONBLOCK status flag changes.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
