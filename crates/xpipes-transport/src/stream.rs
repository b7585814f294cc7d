use std::fs::File;
use std::io::{Read, Write};

#[cfg(unix)]
use crate::sys::unix as sys;
#[cfg(windows)]
use crate::sys::windows as sys;

/// A connected pipe byte stream.
///
/// This is the byte transport handed out by an open
/// [`PipeEnd`](crate::PipeEnd). On Unix it wraps a FIFO descriptor, on
/// Windows a named pipe handle. `flush` pushes written bytes through to the
/// reader (a no-op for kernel FIFOs, `FlushFileBuffers` on Windows).
pub struct PipeStream {
    file: File,
}

impl PipeStream {
    pub(crate) fn from_file(file: File) -> Self {
        Self { file }
    }
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for PipeStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        #[cfg(any(unix, windows))]
        {
            sys::flush(&self.file)
        }
        #[cfg(not(any(unix, windows)))]
        {
            self.file.flush()
        }
    }
}

impl std::fmt::Debug for PipeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if cfg!(windows) { "named-pipe" } else { "fifo" };
        f.debug_struct("PipeStream").field("type", &kind).finish()
    }
}
