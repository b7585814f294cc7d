//! Async pipe ends on top of tokio (Unix FIFOs).
//!
//! Same rendezvous rules as [`PipeEnd`](crate::PipeEnd), but the delay
//! between attempts is a `tokio::time::sleep` instead of blocking the thread.

use std::io;
use std::path::Path;

use tokio::net::unix::pipe;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::name::PipeName;
use crate::retry::RetryPolicy;

/// Open the read end of a FIFO.
///
/// Unlike the blocking read end, this returns as soon as the FIFO exists;
/// reads wait for a writer.
pub async fn open_receiver(
    name: impl Into<PipeName>,
    policy: &RetryPolicy,
) -> Result<pipe::Receiver> {
    let name = name.into();
    retry(&name, policy, |path| pipe::OpenOptions::new().open_receiver(path)).await
}

/// Open the write end of a FIFO, retrying while no reader is present.
pub async fn open_sender(
    name: impl Into<PipeName>,
    policy: &RetryPolicy,
) -> Result<pipe::Sender> {
    let name = name.into();
    retry(&name, policy, |path| pipe::OpenOptions::new().open_sender(path)).await
}

async fn retry<T>(
    name: &PipeName,
    policy: &RetryPolicy,
    mut open: impl FnMut(&Path) -> io::Result<T>,
) -> Result<T> {
    name.validate()?;
    let path = name.os_path();
    let attempts = policy.attempts();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match open(&path) {
            Ok(end) => {
                debug!(?path, attempt, "async pipe end open");
                return Ok(end);
            }
            Err(err) if is_rendezvous_error(&err) => {
                if attempt >= attempts {
                    return Err(TransportError::RetryExhausted {
                        path,
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = policy.delay_for(attempt);
                warn!(?path, attempt, ?delay, error = %err, "pipe not available yet; retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {
                return Err(TransportError::NotAPipe { path });
            }
            Err(source) => return Err(TransportError::Connect { path, source }),
        }
    }
}

fn is_rendezvous_error(err: &io::Error) -> bool {
    crate::sys::unix::is_rendezvous_error(err)
}
