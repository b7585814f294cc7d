use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::Result;
#[cfg(not(unix))]
use crate::error::TransportError;
use crate::name::PipeName;
#[cfg(unix)]
use crate::sys::unix as sys;
#[cfg(windows)]
use crate::sys::windows as sys;

/// Creation options for a named pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    /// Permission bits of the FIFO (Unix only). Default: `0o600`.
    pub mode: u32,
    /// In/out buffer size hint of the pipe instance (Windows only). Default: 64 KiB.
    pub buffer_size: u32,
}

impl PipeOptions {
    /// Default permission mode for created FIFOs.
    pub const DEFAULT_MODE: u32 = 0o600;
    /// Default pipe buffer size hint.
    pub const DEFAULT_BUFFER_SIZE: u32 = 64 * 1024;
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            mode: Self::DEFAULT_MODE,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Platform state of a pipe identity.
enum Backend {
    /// POSIX FIFO. `created` holds the `(dev, ino)` of the FIFO this handle made.
    #[cfg(unix)]
    Fifo { created: Option<sys::FifoId> },
    /// Windows named pipe. `server` is present when this handle created the pipe.
    #[cfg(windows)]
    Native {
        server: Option<std::os::windows::io::OwnedHandle>,
    },
    #[cfg(not(any(unix, windows)))]
    Unsupported,
}

impl Backend {
    fn new() -> Self {
        #[cfg(unix)]
        {
            Backend::Fifo { created: None }
        }
        #[cfg(windows)]
        {
            Backend::Native { server: None }
        }
        #[cfg(not(any(unix, windows)))]
        {
            Backend::Unsupported
        }
    }

    fn is_created(&self) -> bool {
        match self {
            #[cfg(unix)]
            Backend::Fifo { created } => created.is_some(),
            #[cfg(windows)]
            Backend::Native { server } => server.is_some(),
            #[cfg(not(any(unix, windows)))]
            Backend::Unsupported => false,
        }
    }
}

/// A named, addressable pipe identity.
///
/// A handle from [`NamedPipe::new`] only names the pipe. [`NamedPipe::create`]
/// (or [`NamedPipe::mkfifo`]) creates the OS-level identity; a handle that
/// created its identity removes it again when dropped.
pub struct NamedPipe {
    name: PipeName,
    options: PipeOptions,
    backend: Backend,
}

impl NamedPipe {
    /// Name an existing (or future) pipe without creating it.
    pub fn new(name: impl Into<PipeName>) -> Self {
        Self {
            name: name.into(),
            options: PipeOptions::default(),
            backend: Backend::new(),
        }
    }

    /// Create the pipe identity with default options.
    pub fn create(name: impl Into<PipeName>) -> Result<Self> {
        Self::create_with_options(name, PipeOptions::default())
    }

    /// Create the pipe identity with explicit options.
    pub fn create_with_options(name: impl Into<PipeName>, options: PipeOptions) -> Result<Self> {
        let mut pipe = Self::new(name);
        pipe.options = options;
        pipe.mkfifo()?;
        Ok(pipe)
    }

    /// Create the OS-level identity for this handle.
    ///
    /// Not idempotent: fails with [`TransportError::Exists`](crate::TransportError::Exists) if the identity
    /// already exists, including when this handle created it earlier and
    /// has not removed it.
    pub fn mkfifo(&mut self) -> Result<()> {
        self.name.validate()?;
        let path = self.path();

        match &mut self.backend {
            #[cfg(unix)]
            Backend::Fifo { created } => {
                *created = Some(sys::create_fifo(&path, self.options.mode)?);
            }
            #[cfg(windows)]
            Backend::Native { server } => {
                if server.is_some() {
                    return Err(TransportError::Exists { path });
                }
                *server = Some(sys::create_server(&path, self.options.buffer_size)?);
            }
            #[cfg(not(any(unix, windows)))]
            Backend::Unsupported => {
                return Err(TransportError::Unsupported("named pipes"));
            }
        }

        info!(?path, "created named pipe");
        Ok(())
    }

    /// Remove the OS-level identity.
    ///
    /// Fails with [`TransportError::NotFound`](crate::TransportError::NotFound) if the identity does not exist.
    pub fn remove(&mut self) -> Result<()> {
        let path = self.path();

        match &mut self.backend {
            #[cfg(unix)]
            Backend::Fifo { created } => {
                sys::remove_fifo(&path)?;
                *created = None;
            }
            #[cfg(windows)]
            Backend::Native { server } => {
                // The namespace entry lives exactly as long as the server handle.
                if server.take().is_none() {
                    return Err(TransportError::NotFound { path });
                }
            }
            #[cfg(not(any(unix, windows)))]
            Backend::Unsupported => {
                return Err(TransportError::Unsupported("named pipes"));
            }
        }

        info!(?path, "removed named pipe");
        Ok(())
    }

    /// Release ownership: the identity is no longer removed on drop.
    ///
    /// On Windows a pipe lives only as long as its server handle, so the
    /// handle is leaked and the pipe ends with this process.
    pub fn persist(mut self) -> PipeName {
        match &mut self.backend {
            #[cfg(unix)]
            Backend::Fifo { created } => {
                created.take();
            }
            #[cfg(windows)]
            Backend::Native { server } => {
                if let Some(handle) = server.take() {
                    use std::os::windows::io::IntoRawHandle;
                    let _ = handle.into_raw_handle();
                }
            }
            #[cfg(not(any(unix, windows)))]
            Backend::Unsupported => {}
        }
        debug!(path = ?self.path(), "named pipe persisted");
        self.name.clone()
    }

    /// The pipe name as given.
    pub fn name(&self) -> &PipeName {
        &self.name
    }

    /// The OS-level identity.
    pub fn path(&self) -> PathBuf {
        self.name.os_path()
    }

    /// Creation options.
    pub fn options(&self) -> &PipeOptions {
        &self.options
    }

    /// Whether this handle created the identity (and acts as server).
    pub fn is_server(&self) -> bool {
        self.backend.is_created()
    }

    /// Whether the identity currently exists.
    ///
    /// On Windows only the creating handle can tell; other handles report `false`.
    pub fn exists(&self) -> bool {
        match &self.backend {
            #[cfg(unix)]
            Backend::Fifo { .. } => sys::fifo_exists(&self.path()),
            #[cfg(windows)]
            Backend::Native { server } => server.is_some(),
            #[cfg(not(any(unix, windows)))]
            Backend::Unsupported => false,
        }
    }

    /// Duplicate the server handle for a server-role endpoint.
    #[cfg(windows)]
    pub(crate) fn server_handle(&self) -> Result<Option<std::os::windows::io::OwnedHandle>> {
        match &self.backend {
            Backend::Native { server: Some(handle) } => Ok(Some(handle.try_clone()?)),
            Backend::Native { server: None } => Ok(None),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        if cfg!(windows) {
            "windows-named-pipe"
        } else {
            "posix-fifo"
        }
    }
}

impl std::fmt::Debug for NamedPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedPipe")
            .field("path", &self.path())
            .field("server", &self.is_server())
            .finish()
    }
}

impl Drop for NamedPipe {
    fn drop(&mut self) {
        match &mut self.backend {
            #[cfg(unix)]
            Backend::Fifo { created } => {
                let Some(id) = created.take() else {
                    return;
                };
                let path = self.name.os_path();
                if !sys::is_same_fifo(&path, id) {
                    debug!(?path, "fifo identity changed; skipping cleanup");
                    return;
                }
                debug!(?path, "cleaning up fifo");
                if let Err(err) = std::fs::remove_file(&path) {
                    warn!(?path, error = %err, "failed to remove fifo on drop");
                }
            }
            #[cfg(windows)]
            Backend::Native { server } => {
                if server.take().is_some() {
                    debug!(path = ?self.name.os_path(), "closed named pipe server handle");
                }
            }
            #[cfg(not(any(unix, windows)))]
            Backend::Unsupported => {}
        }
    }
}
