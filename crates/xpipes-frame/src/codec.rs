use std::collections::VecDeque;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Frame terminator. Never part of the base64 alphabet, so no escaping.
pub const DELIMITER: u8 = 0x00;

/// Default maximum datagram size (decoded): 16 MiB.
pub const DEFAULT_MAX_DATAGRAM: usize = 16 * 1024 * 1024;

/// Default size of a single raw read: 64 KiB.
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// Length of the base64 encoding of `len` bytes (padded).
pub fn encoded_len(len: usize) -> usize {
    len.div_ceil(3).saturating_mul(4)
}

/// Total bytes on the wire for a datagram of `len` bytes.
pub fn wire_len(len: usize) -> usize {
    encoded_len(len).saturating_add(1)
}

/// Encode a datagram into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────────────────────┬───────┐
/// │ base64(payload)           │ 0x00  │
/// │ standard alphabet, padded │ DELIM │
/// └───────────────────────────┴───────┘
/// ```
/// An empty payload encodes to a lone delimiter.
pub fn encode_datagram(payload: &[u8], dst: &mut BytesMut) {
    let mut encoded = String::with_capacity(encoded_len(payload.len()));
    BASE64.encode_string(payload, &mut encoded);
    dst.reserve(encoded.len() + 1);
    dst.put_slice(encoded.as_bytes());
    dst.put_u8(DELIMITER);
}

/// Configuration for the datagram codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum decoded datagram size in bytes. Default: 16 MiB.
    pub max_datagram_size: usize,
    /// Buffer size for a single raw read. Default: 64 KiB.
    pub read_chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: DEFAULT_MAX_DATAGRAM,
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

/// Reassembles datagrams from arbitrarily split chunks of wire bytes.
///
/// Holds the pending-datagram queue and the carry-over buffer (the
/// unterminated tail of everything fed so far). Does no I/O.
#[derive(Debug)]
pub struct DatagramDecoder {
    pending: VecDeque<Bytes>,
    carry: BytesMut,
    /// Prefix of `carry` already known to contain no delimiter.
    scanned: usize,
    max_datagram_size: usize,
}

impl DatagramDecoder {
    /// Decoder with the default maximum datagram size.
    pub fn new() -> Self {
        Self::with_max_datagram_size(DEFAULT_MAX_DATAGRAM)
    }

    /// Decoder with an explicit maximum datagram size.
    pub fn with_max_datagram_size(max_datagram_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            carry: BytesMut::new(),
            scanned: 0,
            max_datagram_size,
        }
    }

    /// Append a raw chunk and queue every datagram it completes.
    ///
    /// Returns how many datagrams were queued. On a corrupt segment the
    /// datagrams before it stay queued and the corrupt segment stays at the
    /// front of the carry-over buffer.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<usize> {
        self.carry.extend_from_slice(chunk);
        drain_frames(
            &mut self.carry,
            &mut self.scanned,
            &mut self.pending,
            self.max_datagram_size,
        )
    }

    /// Take the oldest decoded datagram.
    pub fn pop(&mut self) -> Option<Bytes> {
        self.pending.pop_front()
    }

    /// Number of decoded datagrams waiting to be taken.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wire bytes received but not yet terminated by a delimiter.
    pub fn carry_over(&self) -> &[u8] {
        &self.carry
    }

    /// Whether the carry-over still holds a terminated segment.
    ///
    /// Only true after `feed` failed: a successful feed leaves no delimiter
    /// behind.
    pub fn has_unresolved_frame(&self) -> bool {
        self.carry.contains(&DELIMITER)
    }

    /// Drop the carry-over buffer. Returns how many bytes were discarded.
    pub fn discard_partial(&mut self) -> usize {
        let discarded = self.carry.len();
        self.carry.clear();
        self.scanned = 0;
        discarded
    }

    /// Update the maximum datagram size for subsequent decoding.
    pub fn set_max_datagram_size(&mut self, max_datagram_size: usize) {
        self.max_datagram_size = max_datagram_size;
    }
}

impl Default for DatagramDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Move every complete frame at the front of `buf` into `pending`.
///
/// `scanned` is the length of the prefix of `buf` already known to be
/// delimiter-free, so slow trickles of one long frame are scanned once.
pub(crate) fn drain_frames(
    buf: &mut BytesMut,
    scanned: &mut usize,
    pending: &mut VecDeque<Bytes>,
    max_datagram_size: usize,
) -> Result<usize> {
    let max_encoded = encoded_len(max_datagram_size);
    let mut queued = 0usize;

    loop {
        let Some(offset) = buf[*scanned..].iter().position(|&b| b == DELIMITER) else {
            *scanned = buf.len();
            if buf.len() > max_encoded {
                return Err(FrameError::DatagramTooLarge {
                    size: buf.len(),
                    max: max_encoded,
                });
            }
            if queued > 0 {
                trace!(queued, carry = buf.len(), "decoded datagrams");
            }
            return Ok(queued);
        };

        let end = *scanned + offset;
        if end > max_encoded {
            return Err(FrameError::DatagramTooLarge {
                size: end,
                max: max_encoded,
            });
        }

        let datagram = BASE64
            .decode(&buf[..end])
            .map_err(|source| FrameError::Corrupt { len: end, source })?;

        buf.advance(end + 1);
        *scanned = 0;
        pending.push_back(Bytes::from(datagram));
        queued += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(data: &[u8]) -> Vec<u8> {
        BASE64.encode(data).into_bytes()
    }

    fn frame(data: &[u8]) -> Vec<u8> {
        let mut wire = b64(data);
        wire.push(DELIMITER);
        wire
    }

    #[test]
    fn encode_is_base64_plus_delimiter() {
        let mut buf = BytesMut::new();
        encode_datagram(b"World", &mut buf);
        assert_eq!(buf.as_ref(), b"V29ybGQ=\0");
        assert_eq!(buf.len(), wire_len(5));
    }

    #[test]
    fn encode_empty_is_lone_delimiter() {
        let mut buf = BytesMut::new();
        encode_datagram(b"", &mut buf);
        assert_eq!(buf.as_ref(), &[DELIMITER]);
    }

    #[test]
    fn encoded_payload_never_contains_delimiter() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let mut buf = BytesMut::new();
        encode_datagram(&payload, &mut buf);
        assert_eq!(buf.iter().filter(|&&b| b == DELIMITER).count(), 1);
        assert_eq!(buf.last(), Some(&DELIMITER));
    }

    #[test]
    fn partial_frame_is_carried_over() {
        let third = b64(b"and the rest of the universe.");
        let mut chunk = frame(b"Hello");
        chunk.extend(frame(b"World"));
        chunk.extend_from_slice(&third[0..2]);

        let mut decoder = DatagramDecoder::new();
        assert_eq!(decoder.feed(&chunk).unwrap(), 2);

        assert_eq!(decoder.pop().unwrap().as_ref(), b"Hello");
        assert_eq!(decoder.pending(), 1);
        assert_eq!(decoder.carry_over(), &third[0..2]);

        assert_eq!(decoder.pop().unwrap().as_ref(), b"World");
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.carry_over(), &third[0..2]);

        let mut rest = third[2..].to_vec();
        rest.push(DELIMITER);
        assert_eq!(decoder.feed(&rest).unwrap(), 1);
        assert_eq!(
            decoder.pop().unwrap().as_ref(),
            b"and the rest of the universe."
        );
        assert!(decoder.carry_over().is_empty());
    }

    #[test]
    fn chunk_ending_on_delimiter_leaves_no_carry_over() {
        let mut chunk = frame(b"Hello");
        chunk.extend(frame(b"World"));

        let mut decoder = DatagramDecoder::new();
        assert_eq!(decoder.feed(&chunk).unwrap(), 2);
        assert!(decoder.carry_over().is_empty());
        assert_eq!(decoder.pending(), 2);
    }

    #[test]
    fn chunk_without_delimiter_queues_nothing() {
        let encoded = b64(b"no terminator yet");
        let mut decoder = DatagramDecoder::new();
        assert_eq!(decoder.feed(&encoded).unwrap(), 0);
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.carry_over(), encoded.as_slice());
    }

    #[test]
    fn interior_double_delimiter_is_empty_datagram() {
        let mut chunk = frame(b"a");
        chunk.push(DELIMITER);
        chunk.extend(frame(b"b"));

        let mut decoder = DatagramDecoder::new();
        assert_eq!(decoder.feed(&chunk).unwrap(), 3);
        assert_eq!(decoder.pop().unwrap().as_ref(), b"a");
        assert!(decoder.pop().unwrap().is_empty());
        assert_eq!(decoder.pop().unwrap().as_ref(), b"b");
        assert!(decoder.pop().is_none());
    }

    #[test]
    fn lone_delimiter_is_one_empty_datagram() {
        let mut decoder = DatagramDecoder::new();
        assert_eq!(decoder.feed(&[DELIMITER]).unwrap(), 1);
        assert!(decoder.pop().unwrap().is_empty());
        assert!(decoder.carry_over().is_empty());
    }

    #[test]
    fn byte_by_byte_feed_reassembles() {
        let mut wire = frame(b"first");
        wire.extend(frame(b""));
        wire.extend(frame(b"third message"));

        let mut decoder = DatagramDecoder::new();
        let mut total = 0;
        for byte in &wire {
            total += decoder.feed(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(total, 3);
        assert_eq!(decoder.pop().unwrap().as_ref(), b"first");
        assert_eq!(decoder.pop().unwrap().as_ref(), b"");
        assert_eq!(decoder.pop().unwrap().as_ref(), b"third message");
    }

    #[test]
    fn delimiter_split_from_its_frame() {
        let encoded = b64(b"split");
        let mut decoder = DatagramDecoder::new();
        assert_eq!(decoder.feed(&encoded).unwrap(), 0);
        assert_eq!(decoder.feed(&[DELIMITER]).unwrap(), 1);
        assert_eq!(decoder.pop().unwrap().as_ref(), b"split");
    }

    #[test]
    fn corrupt_segment_is_reported_and_kept() {
        let mut chunk = frame(b"good");
        chunk.extend_from_slice(b"!!not-base64!!\0");
        chunk.extend(frame(b"after"));

        let mut decoder = DatagramDecoder::new();
        let err = decoder.feed(&chunk).unwrap_err();
        assert!(matches!(err, FrameError::Corrupt { len: 14, .. }));

        assert_eq!(decoder.pending(), 1);
        assert_eq!(decoder.pop().unwrap().as_ref(), b"good");
        assert!(decoder.carry_over().starts_with(b"!!not-base64!!\0"));

        // Still desynchronized: nothing is skipped on the next feed.
        assert!(matches!(
            decoder.feed(b""),
            Err(FrameError::Corrupt { .. })
        ));
    }

    #[test]
    fn discarded_partial_does_not_join_the_next_frame() {
        let mut decoder = DatagramDecoder::new();
        assert_eq!(decoder.feed(b"SGVs").unwrap(), 0);
        assert!(!decoder.has_unresolved_frame());
        assert_eq!(decoder.discard_partial(), 4);

        assert_eq!(decoder.feed(b"bG8=\0").unwrap(), 1);
        assert_eq!(decoder.pop().unwrap().as_ref(), b"lo");
    }

    #[test]
    fn failed_feed_leaves_unresolved_frame() {
        let mut decoder = DatagramDecoder::new();
        assert!(decoder.feed(b"%%\0").is_err());
        assert!(decoder.has_unresolved_frame());
    }

    #[test]
    fn oversized_unterminated_frame_is_rejected() {
        let mut decoder = DatagramDecoder::with_max_datagram_size(3);
        assert!(decoder.feed(b"AAAA").is_ok());
        let err = decoder.feed(b"A").unwrap_err();
        assert!(matches!(
            err,
            FrameError::DatagramTooLarge { size: 5, max: 4 }
        ));
    }

    #[test]
    fn oversized_complete_frame_is_rejected() {
        let mut decoder = DatagramDecoder::with_max_datagram_size(3);
        let err = decoder.feed(&frame(b"four")).unwrap_err();
        assert!(matches!(err, FrameError::DatagramTooLarge { .. }));
    }

    #[test]
    fn binary_roundtrip_through_decoder() {
        let payloads: [&[u8]; 4] = [b"", b"\0\0\0", &[0xFF; 300], b"text"];
        let mut wire = BytesMut::new();
        for payload in payloads {
            encode_datagram(payload, &mut wire);
        }

        let mut decoder = DatagramDecoder::new();
        assert_eq!(decoder.feed(&wire).unwrap(), payloads.len());
        for payload in payloads {
            assert_eq!(decoder.pop().unwrap().as_ref(), payload);
        }
    }
}
