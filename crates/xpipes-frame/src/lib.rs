//! Datagram framing over byte streams.
//!
//! Every datagram is base64-encoded (standard alphabet, padded) and
//! terminated by a single NUL byte. The base64 alphabet never contains NUL,
//! so frames need no escaping and any byte stream (pipe, socket, buffer)
//! can carry them regardless of how reads split it.
//!
//! No partial reads, no buffer management in user code.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod datagram;
pub mod error;

#[cfg(feature = "async")]
pub use async_codec::AsyncDatagramCodec;
pub use codec::{
    encode_datagram, encoded_len, wire_len, DatagramDecoder, FrameConfig, DEFAULT_MAX_DATAGRAM,
    DEFAULT_READ_CHUNK, DELIMITER,
};
pub use datagram::DatagramCodec;
pub use error::{FrameError, Result};
