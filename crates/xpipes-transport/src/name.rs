use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, TransportError};

/// Namespace prefix for Windows named pipes.
pub const WINDOWS_PIPE_PREFIX: &str = r"\\.\pipe\";

/// The addressable identity of a named pipe.
///
/// On Unix the name is a filesystem path and is used verbatim. On Windows the
/// name lives in the `\\.\pipe\` namespace: forward slashes become
/// backslashes and the prefix is prepended unless already present.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipeName {
    raw: PathBuf,
}

impl PipeName {
    /// Create a pipe name from a path or bare name.
    pub fn new(name: impl Into<PathBuf>) -> Self {
        Self { raw: name.into() }
    }

    /// The name as given by the caller.
    pub fn as_path(&self) -> &Path {
        &self.raw
    }

    /// The OS-level identity of this pipe.
    #[cfg(not(windows))]
    pub fn os_path(&self) -> PathBuf {
        self.raw.clone()
    }

    /// The OS-level identity of this pipe.
    #[cfg(windows)]
    pub fn os_path(&self) -> PathBuf {
        PathBuf::from(to_windows_pipe_path(&self.raw.to_string_lossy()))
    }

    /// Check that the name can be handed to the OS.
    pub fn validate(&self) -> Result<()> {
        let raw = self.raw.as_os_str();
        if raw.is_empty() {
            return Err(self.invalid("name is empty"));
        }
        if contains_nul(raw) {
            return Err(self.invalid("name contains a NUL byte"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &'static str) -> TransportError {
        TransportError::InvalidName {
            name: self.raw.to_string_lossy().into_owned(),
            reason,
        }
    }
}

/// Translate a bare pipe name into its `\\.\pipe\` path.
pub fn to_windows_pipe_path(name: &str) -> String {
    if name.starts_with(WINDOWS_PIPE_PREFIX) {
        return name.to_string();
    }
    format!("{WINDOWS_PIPE_PREFIX}{name}").replace('/', "\\")
}

fn contains_nul(s: &OsStr) -> bool {
    s.as_encoded_bytes().contains(&0)
}

impl fmt::Display for PipeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.os_path().display())
    }
}

impl From<&str> for PipeName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PipeName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&Path> for PipeName {
    fn from(value: &Path) -> Self {
        Self::new(value)
    }
}

impl From<PathBuf> for PipeName {
    fn from(value: PathBuf) -> Self {
        Self::new(value)
    }
}

impl From<&PathBuf> for PipeName {
    fn from(value: &PathBuf) -> Self {
        Self::new(value.clone())
    }
}

impl From<&PipeName> for PipeName {
    fn from(value: &PipeName) -> Self {
        value.clone()
    }
}
