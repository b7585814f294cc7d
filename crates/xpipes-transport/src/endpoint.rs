use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::name::PipeName;
use crate::pipe::NamedPipe;
use crate::retry::RetryPolicy;
use crate::stream::PipeStream;
#[cfg(unix)]
use crate::sys::unix as sys;
#[cfg(windows)]
use crate::sys::windows as sys;

/// Largest chunk returned by a single [`PipeEnd::recv`].
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Which way bytes flow through an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn verb(self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
        }
    }
}

/// Whether an endpoint connects to a pipe it created or to someone else's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opens the pipe by name.
    Client,
    /// Owns the server object and waits for a client (Windows named pipes).
    Server,
}

enum Connector {
    Client,
    #[cfg(windows)]
    Server(std::os::windows::io::OwnedHandle),
}

/// One directional connection to a named pipe.
///
/// `Closed → open → Open → close → Closed`. Opening an open endpoint fails
/// with [`TransportError::AlreadyOpen`], closing a closed one with
/// [`TransportError::NotOpen`]. A failed open leaves the endpoint closed and
/// may be retried. Dropping an open endpoint closes it.
pub struct PipeEnd {
    name: PipeName,
    direction: Direction,
    connector: Connector,
    retry: RetryPolicy,
    stream: Option<PipeStream>,
}

impl PipeEnd {
    /// Endpoint for a pipe resource.
    ///
    /// On Windows, an endpoint for a pipe this process created takes the
    /// server role and duplicates the server handle.
    pub fn new(pipe: &NamedPipe, direction: Direction) -> Result<Self> {
        #[cfg(windows)]
        let connector = match pipe.server_handle()? {
            Some(handle) => Connector::Server(handle),
            None => Connector::Client,
        };
        #[cfg(not(windows))]
        let connector = Connector::Client;

        Ok(Self {
            name: pipe.name().clone(),
            direction,
            connector,
            retry: RetryPolicy::default(),
            stream: None,
        })
    }

    /// Endpoint for a pipe identified only by name; nothing is created.
    pub fn from_name(name: impl Into<PipeName>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
            connector: Connector::Client,
            retry: RetryPolicy::default(),
            stream: None,
        }
    }

    /// Read endpoint for a pipe identified by name.
    pub fn reader(name: impl Into<PipeName>) -> Self {
        Self::from_name(name, Direction::Read)
    }

    /// Write endpoint for a pipe identified by name.
    pub fn writer(name: impl Into<PipeName>) -> Self {
        Self::from_name(name, Direction::Write)
    }

    /// Override the retry policy used by [`PipeEnd::open`].
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Open with the endpoint's retry policy.
    pub fn open(&mut self) -> Result<()> {
        let policy = self.retry;
        self.open_with(&policy)
    }

    /// Open with `max_attempts` tries, sleeping `retry_delay` in between.
    pub fn open_retrying(&mut self, max_attempts: u32, retry_delay: Duration) -> Result<()> {
        self.open_with(&RetryPolicy::fixed(max_attempts, retry_delay))
    }

    /// Open with an explicit retry policy.
    ///
    /// Rendezvous failures (pipe not created yet, no reader on the other
    /// end, all instances busy) are retried; exhausting the policy yields
    /// [`TransportError::RetryExhausted`]. Other failures return immediately.
    pub fn open_with(&mut self, policy: &RetryPolicy) -> Result<()> {
        if self.stream.is_some() {
            return Err(TransportError::AlreadyOpen);
        }
        self.name.validate()?;

        let path = self.name.os_path();
        let attempts = policy.attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(?path, direction = self.direction.verb(), attempt, "opening pipe end");

            match self.connect(&path) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    debug!(?path, direction = self.direction.verb(), "pipe end open");
                    return Ok(());
                }
                Err(ConnectFailure::Fatal(err)) => return Err(err),
                Err(ConnectFailure::Rendezvous(source)) => {
                    if attempt >= attempts {
                        return Err(TransportError::RetryExhausted {
                            path,
                            attempts: attempt,
                            source,
                        });
                    }
                    let delay = policy.delay_for(attempt);
                    warn!(?path, attempt, ?delay, error = %source, "pipe not available yet; retrying");
                    std::thread::sleep(delay);
                }
            }
        }
    }

    fn connect(&self, path: &Path) -> std::result::Result<PipeStream, ConnectFailure> {
        match &self.connector {
            Connector::Client => {
                #[cfg(unix)]
                {
                    let file = sys::open_end(path, self.direction)
                        .map_err(|err| ConnectFailure::classify(path, err))?;
                    match sys::is_fifo(&file) {
                        Ok(true) => Ok(PipeStream::from_file(file)),
                        Ok(false) => Err(ConnectFailure::Fatal(TransportError::NotAPipe {
                            path: path.to_path_buf(),
                        })),
                        Err(err) => Err(ConnectFailure::Fatal(TransportError::Io(err))),
                    }
                }
                #[cfg(windows)]
                {
                    sys::open_client(path, self.direction)
                        .map(PipeStream::from_file)
                        .map_err(|err| ConnectFailure::classify(path, err))
                }
                #[cfg(not(any(unix, windows)))]
                {
                    let _ = path;
                    Err(ConnectFailure::Fatal(TransportError::Unsupported(
                        "named pipes",
                    )))
                }
            }
            #[cfg(windows)]
            Connector::Server(handle) => sys::connect_server(handle)
                .map(PipeStream::from_file)
                .map_err(|source| {
                    ConnectFailure::Fatal(TransportError::Connect {
                        path: path.to_path_buf(),
                        source,
                    })
                }),
        }
    }

    /// Release the OS handle.
    ///
    /// A server-role endpoint disconnects its client first; a write end
    /// flushes before disconnecting so the client can drain what was sent.
    pub fn close(&mut self) -> Result<()> {
        let stream = self.stream.take().ok_or(TransportError::NotOpen)?;

        #[cfg(windows)]
        if let Connector::Server(handle) = &self.connector {
            let mut stream = stream;
            let direction = self.direction;
            let result = flush_then_disconnect(
                || match direction {
                    Direction::Write => stream.flush(),
                    Direction::Read => Ok(()),
                },
                || sys::disconnect_server(handle),
            );
            drop(stream);
            result?;
            debug!(path = ?self.name.os_path(), "disconnected pipe server end");
            return Ok(());
        }

        drop(stream);
        debug!(path = ?self.name.os_path(), direction = self.direction.verb(), "closed pipe end");
        Ok(())
    }

    /// Write all bytes and flush them through to the reader.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.checked_stream(Direction::Write)?;
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    /// Read whatever is available (blocking until at least one byte).
    ///
    /// Returns `Ok(None)` at end of stream, i.e. once every writer has closed.
    pub fn recv(&mut self) -> Result<Option<Bytes>> {
        let stream = self.checked_stream(Direction::Read)?;
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(Bytes::from(buf)));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn checked_stream(&mut self, wanted: Direction) -> Result<&mut PipeStream> {
        if self.direction != wanted {
            return Err(TransportError::Io(std::io::Error::new(
                ErrorKind::Unsupported,
                format!("cannot {} on a {} end", wanted.verb(), self.direction.verb()),
            )));
        }
        self.stream.as_mut().ok_or(TransportError::NotOpen)
    }

    /// Whether the endpoint currently holds an OS handle.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Direction of this endpoint.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Client or server role.
    pub fn role(&self) -> Role {
        match self.connector {
            Connector::Client => Role::Client,
            #[cfg(windows)]
            Connector::Server(_) => Role::Server,
        }
    }

    /// Name of the pipe this endpoint connects to.
    pub fn name(&self) -> &PipeName {
        &self.name
    }
}

/// Run `disconnect` even when `flush` fails; the flush error wins.
#[cfg(any(windows, test))]
fn flush_then_disconnect(
    flush: impl FnOnce() -> std::io::Result<()>,
    disconnect: impl FnOnce() -> std::io::Result<()>,
) -> std::io::Result<()> {
    let flushed = flush();
    let disconnected = disconnect();
    flushed.and(disconnected)
}

enum ConnectFailure {
    Rendezvous(std::io::Error),
    Fatal(TransportError),
}

impl ConnectFailure {
    #[cfg(any(unix, windows))]
    fn classify(path: &Path, err: std::io::Error) -> Self {
        if sys::is_rendezvous_error(&err) {
            Self::Rendezvous(err)
        } else {
            Self::Fatal(TransportError::Connect {
                path: path.to_path_buf(),
                source: err,
            })
        }
    }
}

fn into_io(err: TransportError) -> std::io::Error {
    match err {
        TransportError::Io(err) => err,
        TransportError::NotOpen => {
            std::io::Error::new(ErrorKind::NotConnected, "pipe endpoint is not open")
        }
        other => std::io::Error::other(other),
    }
}

impl Read for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.checked_stream(Direction::Read)
            .map_err(into_io)?
            .read(buf)
    }
}

impl Write for PipeEnd {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.checked_stream(Direction::Write)
            .map_err(into_io)?
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.checked_stream(Direction::Write)
            .map_err(into_io)?
            .flush()
    }
}

impl std::fmt::Debug for PipeEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeEnd")
            .field("path", &self.name.os_path())
            .field("direction", &self.direction)
            .field("role", &self.role())
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for PipeEnd {
    fn drop(&mut self) {
        if self.stream.is_some() {
            if let Err(err) = self.close() {
                warn!(path = ?self.name.os_path(), error = %err, "failed to close pipe end on drop");
            }
        }
    }
}

#[cfg(test)]
mod close_tests {
    use std::cell::Cell;
    use std::io;

    use super::flush_then_disconnect;

    #[test]
    fn disconnect_runs_when_flush_fails() {
        let disconnected = Cell::new(false);
        let err = flush_then_disconnect(
            || Err(io::Error::from(io::ErrorKind::BrokenPipe)),
            || {
                disconnected.set(true);
                Ok(())
            },
        )
        .unwrap_err();
        assert!(disconnected.get());
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn first_error_is_reported() {
        let err = flush_then_disconnect(
            || Err(io::Error::from(io::ErrorKind::BrokenPipe)),
            || Err(io::Error::from(io::ErrorKind::NotConnected)),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let err = flush_then_disconnect(
            || Ok(()),
            || Err(io::Error::from(io::ErrorKind::NotConnected)),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::thread;

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "xpipes-end-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn open_without_pipe_exhausts_retries() {
        let dir = temp_dir("exhaust");
        let mut end = PipeEnd::writer(dir.join("absent"));

        let err = end.open_with(&RetryPolicy::immediate(4)).unwrap_err();
        match err {
            TransportError::RetryExhausted { attempts, source, .. } => {
                assert_eq!(attempts, 4);
                assert_eq!(source.kind(), ErrorKind::NotFound);
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        assert!(!end.is_open());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn writer_without_reader_exhausts_retries() {
        let dir = temp_dir("no-reader");
        let pipe = NamedPipe::create(dir.join("p")).unwrap();
        let mut end = PipeEnd::new(&pipe, Direction::Write)
            .unwrap()
            .with_retry_policy(RetryPolicy::immediate(2));

        let err = end.open().unwrap_err();
        match err {
            TransportError::RetryExhausted { attempts, source, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(source.raw_os_error(), Some(libc::ENXIO));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        drop(pipe);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_open_can_be_retried_after_peer_appears() {
        let dir = temp_dir("late-peer");
        let path = dir.join("p");
        let mut writer = PipeEnd::writer(&path);

        assert!(matches!(
            writer.open_with(&RetryPolicy::immediate(2)),
            Err(TransportError::RetryExhausted { .. })
        ));

        let pipe = NamedPipe::create(&path).unwrap();
        let reader_path = path.clone();
        let reader = thread::spawn(move || {
            let mut reader = PipeEnd::reader(&reader_path);
            reader.open().unwrap();
            let chunk = reader.recv().unwrap().unwrap();
            reader.close().unwrap();
            chunk
        });

        writer
            .open_with(&RetryPolicy::fixed(200, Duration::from_millis(10)))
            .expect("open should succeed once the reader is present");
        writer.send(b"hello").unwrap();
        writer.close().unwrap();

        assert_eq!(reader.join().unwrap().as_ref(), b"hello");
        drop(pipe);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_retrying_waits_for_creation() {
        let dir = temp_dir("late-create");
        let path = dir.join("p");

        let creator_path = path.clone();
        let creator = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let pipe = NamedPipe::create(&creator_path).unwrap();
            let mut writer = PipeEnd::new(&pipe, Direction::Write)
                .unwrap()
                .with_retry_policy(RetryPolicy::fixed(200, Duration::from_millis(10)));
            writer.open().unwrap();
            writer.send(b"late").unwrap();
            writer.close().unwrap();
            pipe
        });

        let mut reader = PipeEnd::reader(&path);
        reader
            .open_retrying(200, Duration::from_millis(10))
            .expect("reader should open once the fifo exists");
        assert_eq!(reader.recv().unwrap().unwrap().as_ref(), b"late");
        assert_eq!(reader.recv().unwrap(), None);
        reader.close().unwrap();

        drop(creator.join().unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn double_open_and_double_close_fail() {
        let dir = temp_dir("double");
        let pipe = NamedPipe::create(dir.join("p")).unwrap();
        let path = pipe.path();

        let reader = thread::spawn(move || {
            let mut reader = PipeEnd::reader(&path);
            reader.open().unwrap();
            while reader.recv().unwrap().is_some() {}
        });

        let mut writer = PipeEnd::new(&pipe, Direction::Write)
            .unwrap()
            .with_retry_policy(RetryPolicy::fixed(200, Duration::from_millis(10)));
        writer.open().unwrap();
        assert!(matches!(writer.open(), Err(TransportError::AlreadyOpen)));
        assert!(writer.is_open());

        writer.close().unwrap();
        assert!(matches!(writer.close(), Err(TransportError::NotOpen)));

        reader.join().unwrap();
        drop(pipe);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn io_on_closed_endpoint_is_not_connected() {
        let mut end = PipeEnd::writer("/tmp/xpipes-never-opened");
        assert!(matches!(end.send(b"x"), Err(TransportError::NotOpen)));
        let err = end.write(b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[test]
    fn wrong_direction_is_rejected() {
        let mut end = PipeEnd::writer("/tmp/xpipes-never-opened");
        let mut buf = [0u8; 4];
        let err = end.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(matches!(end.recv(), Err(TransportError::Io(_))));
    }

    #[test]
    fn opening_regular_file_is_not_a_pipe() {
        let dir = temp_dir("regular");
        let path = dir.join("plain");
        std::fs::write(&path, b"data").unwrap();

        let mut end = PipeEnd::reader(&path);
        let err = end.open_with(&RetryPolicy::no_retry()).unwrap_err();
        assert!(matches!(err, TransportError::NotAPipe { .. }));
        assert!(!end.is_open());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn permission_denied_is_not_retried() {
        if unsafe { libc::geteuid() } == 0 {
            // root bypasses file permissions
            return;
        }
        let dir = temp_dir("denied");
        let options = crate::PipeOptions {
            mode: 0o000,
            ..crate::PipeOptions::default()
        };
        let pipe = NamedPipe::create_with_options(dir.join("p"), options).unwrap();
        let mut end = PipeEnd::new(&pipe, Direction::Read).unwrap();

        let err = end.open_with(&RetryPolicy::immediate(5)).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        drop(pipe);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unix_endpoints_are_clients() {
        let dir = temp_dir("role");
        let pipe = NamedPipe::create(dir.join("p")).unwrap();
        let end = PipeEnd::new(&pipe, Direction::Read).unwrap();
        assert_eq!(end.role(), Role::Client);
        assert_eq!(end.direction(), Direction::Read);
        assert_eq!(end.name(), pipe.name());
        drop(pipe);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
