//! Datagram framing for tokio byte streams.
//!
//! Use with `tokio_util::codec::{FramedRead, FramedWrite, Framed}`. The
//! framed buffer is the carry-over; decoded datagrams queue here until the
//! stream polls them.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::codec::{drain_frames, encode_datagram, wire_len, FrameConfig};
use crate::error::FrameError;

/// `tokio_util` codec for base64 + NUL datagrams.
#[derive(Debug)]
pub struct AsyncDatagramCodec {
    pending: VecDeque<Bytes>,
    scanned: usize,
    config: FrameConfig,
}

impl AsyncDatagramCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            pending: VecDeque::new(),
            scanned: 0,
            config,
        }
    }

    /// Number of decoded datagrams not yet yielded.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for AsyncDatagramCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AsyncDatagramCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(datagram) = self.pending.pop_front() {
            return Ok(Some(datagram));
        }
        drain_frames(
            src,
            &mut self.scanned,
            &mut self.pending,
            self.config.max_datagram_size,
        )?;
        Ok(self.pending.pop_front())
    }

    /// Clean EOF ends the stream; EOF inside a frame is `ConnectionClosed`.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(datagram) => Ok(Some(datagram)),
            None if src.is_empty() => Ok(None),
            None => {
                warn!(discarded = src.len(), "stream closed mid-frame; partial frame dropped");
                src.clear();
                self.scanned = 0;
                Err(FrameError::ConnectionClosed)
            }
        }
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for AsyncDatagramCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.as_ref();
        if payload.len() > self.config.max_datagram_size {
            return Err(FrameError::DatagramTooLarge {
                size: payload.len(),
                max: self.config.max_datagram_size,
            });
        }
        dst.reserve(wire_len(payload.len()));
        encode_datagram(payload, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::DELIMITER;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, AsyncDatagramCodec::new());
        let mut stream = FramedRead::new(server, AsyncDatagramCodec::new());

        let writer = tokio::spawn(async move {
            sink.send(b"first".as_slice()).await.unwrap();
            sink.send(Vec::<u8>::new()).await.unwrap();
            sink.send(vec![0xAB; 1000]).await.unwrap();
        });

        assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), b"first");
        assert!(stream.next().await.unwrap().unwrap().is_empty());
        assert_eq!(
            stream.next().await.unwrap().unwrap().as_ref(),
            vec![0xAB; 1000].as_slice()
        );

        writer.await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn same_wire_bytes_as_blocking_codec() {
        let mut blocking = crate::DatagramCodec::new(Vec::new());
        blocking.write(b"parity").unwrap();
        blocking.write(b"").unwrap();

        let mut encoded = BytesMut::new();
        let mut codec = AsyncDatagramCodec::new();
        codec.encode(b"parity".as_slice(), &mut encoded).unwrap();
        codec.encode(b"".as_slice(), &mut encoded).unwrap();

        assert_eq!(encoded.as_ref(), blocking.get_ref().as_slice());
    }

    #[tokio::test]
    async fn trickled_bytes_reassemble() {
        let (mut client, server) = tokio::io::duplex(4);
        let mut stream = FramedRead::new(server, AsyncDatagramCodec::new());

        tokio::spawn(async move {
            let mut wire = BytesMut::new();
            encode_datagram(b"Hello", &mut wire);
            encode_datagram(b"World", &mut wire);
            for byte in wire.iter() {
                client.write_all(&[*byte]).await.unwrap();
            }
        });

        assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), b"Hello");
        assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), b"World");
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn decode_queues_whole_chunk() {
        let mut codec = AsyncDatagramCodec::new();
        let mut buf = BytesMut::new();
        encode_datagram(b"a", &mut buf);
        encode_datagram(b"b", &mut buf);
        buf.extend_from_slice(b"Yw");

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"a");
        assert_eq!(codec.pending(), 1);
        assert_eq!(buf.as_ref(), b"Yw");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"b");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"==");
        buf.extend_from_slice(&[DELIMITER]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"c");
        assert!(buf.is_empty());
    }

    #[test]
    fn eof_mid_frame_is_connection_closed() {
        let mut codec = AsyncDatagramCodec::new();
        let mut buf = BytesMut::from(&b"SGVs"[..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::ConnectionClosed)
        ));
        assert!(buf.is_empty());

        buf.extend_from_slice(b"bG8=\0");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"lo");

        let mut empty = BytesMut::new();
        assert!(codec.decode_eof(&mut empty).unwrap().is_none());
    }

    #[test]
    fn corrupt_segment_is_an_error() {
        let mut codec = AsyncDatagramCodec::new();
        let mut buf = BytesMut::from(&b"@@\0"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::Corrupt { .. })
        ));
        assert_eq!(buf.as_ref(), b"@@\0");
    }

    #[test]
    fn oversized_item_is_rejected() {
        let mut codec = AsyncDatagramCodec::with_config(FrameConfig {
            max_datagram_size: 2,
            ..FrameConfig::default()
        });
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(b"abc".as_slice(), &mut buf),
            Err(FrameError::DatagramTooLarge { size: 3, max: 2 })
        ));
        assert!(buf.is_empty());
    }
}
