/// Errors that can occur during datagram encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A delimited segment is not valid base64: the peer and the codec are
    /// out of sync.
    #[error("corrupt frame ({len} encoded bytes): {source}")]
    Corrupt {
        len: usize,
        source: base64::DecodeError,
    },

    /// The datagram exceeds the configured maximum size.
    #[error("datagram too large ({size} bytes, max {max})")]
    DatagramTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pipe endpoint could not be opened or closed.
    #[error("pipe error: {0}")]
    Transport(#[from] xpipes_transport::TransportError),

    /// The stream ended before another complete datagram arrived.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
