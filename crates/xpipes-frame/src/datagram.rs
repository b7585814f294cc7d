use std::io::{ErrorKind, Read, Write};

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};
use xpipes_transport::{PipeEnd, RetryPolicy};

use crate::codec::{encode_datagram, wire_len, DatagramDecoder, FrameConfig};
use crate::error::{FrameError, Result};

/// Reads and writes whole datagrams over any byte stream.
///
/// Partial reads are handled internally: callers always get complete
/// datagrams, in wire order. The pending queue and carry-over buffer are
/// private to this instance.
pub struct DatagramCodec<T> {
    inner: T,
    decoder: DatagramDecoder,
    chunk: Vec<u8>,
    out: BytesMut,
    config: FrameConfig,
}

impl<T> DatagramCodec<T> {
    /// Create a codec with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            decoder: DatagramDecoder::with_max_datagram_size(config.max_datagram_size),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
            out: BytesMut::new(),
            config,
        }
    }

    /// Number of decoded datagrams waiting to be read.
    pub fn pending(&self) -> usize {
        self.decoder.pending()
    }

    /// Bytes received but not yet resolved into a complete frame.
    pub fn carry_over(&self) -> &[u8] {
        self.decoder.carry_over()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    ///
    /// Reading from it directly bypasses the carry-over buffer.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the codec and return the inner stream.
    ///
    /// Queued datagrams and carry-over bytes are discarded.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum datagram size for subsequent reads and writes.
    pub fn set_max_datagram_size(&mut self, max_datagram_size: usize) {
        self.config.max_datagram_size = max_datagram_size;
        self.decoder.set_max_datagram_size(max_datagram_size);
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Read> DatagramCodec<T> {
    /// Read the next datagram (blocking).
    ///
    /// A queued datagram is returned without touching the stream. Returns
    /// `Err(FrameError::ConnectionClosed)` when EOF is reached with nothing
    /// queued. An unterminated frame in flight at EOF is discarded, so a
    /// later writer on a reopened stream starts from a clean frame boundary.
    ///
    /// After a `Corrupt` error the bad segment stays buffered and is
    /// reported again once the queue is drained.
    pub fn read(&mut self) -> Result<Bytes> {
        loop {
            if let Some(datagram) = self.decoder.pop() {
                trace!(len = datagram.len(), pending = self.decoder.pending(), "datagram read");
                return Ok(datagram);
            }

            if self.decoder.has_unresolved_frame() {
                self.decoder.feed(&[])?;
                continue;
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                let discarded = self.decoder.discard_partial();
                if discarded > 0 {
                    warn!(discarded, "stream closed mid-frame; partial frame dropped");
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.decoder.feed(&self.chunk[..read])?;
        }
    }
}

impl<T: Write> DatagramCodec<T> {
    /// Frame and write one datagram, then flush the stream.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_datagram_size {
            return Err(FrameError::DatagramTooLarge {
                size: payload.len(),
                max: self.config.max_datagram_size,
            });
        }

        self.out.clear();
        self.out.reserve(wire_len(payload.len()));
        encode_datagram(payload, &mut self.out);

        self.inner.write_all(&self.out)?;
        self.inner.flush()?;
        trace!(len = payload.len(), wire = self.out.len(), "datagram written");
        Ok(())
    }
}

impl DatagramCodec<PipeEnd> {
    /// Open the wrapped endpoint with its own retry policy.
    pub fn open(&mut self) -> Result<()> {
        self.inner.open()?;
        Ok(())
    }

    /// Open the wrapped endpoint with an explicit retry policy.
    pub fn open_with(&mut self, policy: &RetryPolicy) -> Result<()> {
        self.inner.open_with(policy)?;
        Ok(())
    }

    /// Close the wrapped endpoint.
    ///
    /// Queued datagrams are kept for a reopened endpoint. A partial frame
    /// cut off by EOF has already been dropped by `read`.
    pub fn close(&mut self) -> Result<()> {
        self.inner.close()?;
        Ok(())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for DatagramCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramCodec")
            .field("inner", &self.inner)
            .field("pending", &self.decoder.pending())
            .field("carry_over", &self.decoder.carry_over().len())
            .field("config", &self.config)
            .finish()
    }
}
