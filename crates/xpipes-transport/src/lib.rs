//! Cross-platform named pipe lifecycle.
//!
//! Provides one contract over two incompatible OS primitives:
//! - POSIX FIFOs (`mkfifo`/`unlink`, Linux/macOS)
//! - Windows named pipes (`CreateNamedPipeW`, server/client roles)
//!
//! [`NamedPipe`] owns the addressable identity, [`PipeEnd`] opens one
//! direction of it with bounded retry, and [`PipeStream`] is the byte
//! stream that everything above builds on.

pub mod endpoint;
pub mod error;
pub mod name;
pub mod pipe;
pub mod retry;
pub mod stream;
mod sys;

#[cfg(all(unix, feature = "async"))]
pub mod tokio_pipe;

pub use endpoint::{Direction, PipeEnd, Role, READ_CHUNK_SIZE};
pub use error::{Result, TransportError};
pub use name::{PipeName, WINDOWS_PIPE_PREFIX};
pub use pipe::{NamedPipe, PipeOptions};
pub use retry::{Backoff, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use stream::PipeStream;
