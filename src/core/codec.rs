//! Frame codec.
//!
//! Wire frame:
//! ```text
//! [Length(4, BE)] [Header(2, BE)] [Payload(Length - 2)]
//! ```
//! `Length` counts the header and payload, never itself. Big-endian is the only
//! byte order accepted.
//!
//! Three entry points:
//! - [`decode`]: one buffer, one frame. Trailing bytes are ignored.
//! - [`FrameCodec`]: tokio-util codec for plaintext streams (clients, tests).
//! - [`FrameAssembler`]: per-connection reassembly used by the server. Bytes are
//!   deciphered lazily, only when a frame actually consumes them, so a frame
//!   that switches encryption on never drags earlier bytes through the cipher.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::core::composer::{PacketComposer, LENGTH_FIELD_LEN};
use crate::core::packet::{ClientPacket, HEADER_LEN};
use crate::error::{FrameError, ProtocolError};

/// Smallest complete frame: length field plus header.
pub const MIN_FRAME_LEN: usize = LENGTH_FIELD_LEN + HEADER_LEN;

/// Default cap on a single frame, length field included.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8192;

fn read_length(buf: &[u8]) -> usize {
    (&buf[..LENGTH_FIELD_LEN]).get_u32() as usize
}

fn read_header(buf: &[u8]) -> u16 {
    (&buf[LENGTH_FIELD_LEN..MIN_FRAME_LEN]).get_u16()
}

/// Unframe a single message from `buffer`.
///
/// Fails with `Truncated` below 6 bytes and with `InvalidLength` when the
/// declared length is under 2 or runs past the available bytes.
pub fn decode(buffer: &[u8]) -> Result<ClientPacket, FrameError> {
    if buffer.len() < MIN_FRAME_LEN {
        return Err(FrameError::Truncated {
            available: buffer.len(),
        });
    }

    let declared = read_length(buffer);
    if declared < HEADER_LEN || declared > buffer.len() - LENGTH_FIELD_LEN {
        return Err(FrameError::InvalidLength {
            declared,
            available: buffer.len(),
        });
    }

    let header = read_header(buffer);
    let body = Bytes::copy_from_slice(&buffer[LENGTH_FIELD_LEN..LENGTH_FIELD_LEN + declared]);
    Ok(ClientPacket::new(header, body))
}

/// Frame a header and payload. Mostly useful to clients and tests; the server
/// composes through [`PacketComposer`].
pub fn encode(header: u16, payload: &[u8]) -> Bytes {
    let mut composer = PacketComposer::new(header);
    composer.append_raw_bytes(payload);
    composer.finish()
}

/// Stream codec for plaintext frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = ClientPacket;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < MIN_FRAME_LEN {
            return Ok(None);
        }

        let declared = read_length(src);
        if declared < HEADER_LEN {
            return Err(FrameError::InvalidLength {
                declared,
                available: src.len(),
            }
            .into());
        }

        let total = declared.saturating_add(LENGTH_FIELD_LEN);
        if total > self.max_frame_size {
            return Err(FrameError::Oversized {
                declared: total,
                limit: self.max_frame_size,
            }
            .into());
        }

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total).freeze();
        let header = read_header(&frame);
        Ok(Some(ClientPacket::new(header, frame.slice(LENGTH_FIELD_LEN..))))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&frame);
        Ok(())
    }
}

impl Encoder<PacketComposer> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, composer: PacketComposer, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&composer.finish());
        Ok(())
    }
}

/// Per-connection frame reassembly with lazy deciphering.
///
/// Received bytes sit in `raw` until a frame needs them; only then are they
/// passed through the decipher callback and moved into `plain`.
#[derive(Debug)]
pub struct FrameAssembler {
    max_frame_size: usize,
    raw: BytesMut,
    plain: BytesMut,
    skip: usize,
}

impl FrameAssembler {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            raw: BytesMut::with_capacity(max_frame_size),
            plain: BytesMut::with_capacity(max_frame_size),
            skip: 0,
        }
    }

    /// Queue a received chunk. The chunk is copied; the caller's buffer is
    /// never touched.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.raw.extend_from_slice(chunk);
    }

    /// Bytes received but not yet handed out as frames.
    pub fn buffered_len(&self) -> usize {
        self.raw.len() + self.plain.len()
    }

    // Move raw bytes into `plain` until it holds `target` bytes or raw runs dry.
    fn fill<F: FnMut(&mut [u8])>(&mut self, target: usize, decipher: &mut F) -> bool {
        if self.plain.len() < target {
            let take = (target - self.plain.len()).min(self.raw.len());
            if take > 0 {
                let mut chunk = self.raw.split_to(take);
                decipher(&mut chunk);
                self.plain.unsplit(chunk);
            }
        }
        self.plain.len() >= target
    }

    // Discard what is left of an oversize frame. Raw bytes still go through
    // the cipher so the keystream stays aligned with the peer.
    fn drain_skip<F: FnMut(&mut [u8])>(&mut self, decipher: &mut F) {
        let from_plain = self.skip.min(self.plain.len());
        self.plain.advance(from_plain);
        self.skip -= from_plain;

        let from_raw = self.skip.min(self.raw.len());
        if from_raw > 0 {
            let mut dropped = self.raw.split_to(from_raw);
            decipher(&mut dropped);
            self.skip -= from_raw;
        }
    }

    /// Next complete frame, `Ok(None)` when more bytes are needed.
    ///
    /// Errors are per frame: keep calling after one to continue with the
    /// following bytes.
    pub fn next_frame<F: FnMut(&mut [u8])>(
        &mut self,
        mut decipher: F,
    ) -> Result<Option<ClientPacket>, FrameError> {
        if self.skip > 0 {
            self.drain_skip(&mut decipher);
            if self.skip > 0 {
                return Ok(None);
            }
        }

        if !self.fill(MIN_FRAME_LEN, &mut decipher) {
            return Ok(None);
        }

        let declared = read_length(&self.plain);
        if declared < HEADER_LEN {
            // No way to find the next frame boundary; drop everything buffered.
            let available = self.buffered_len();
            self.plain.clear();
            let mut rest = self.raw.split();
            decipher(&mut rest);
            return Err(FrameError::InvalidLength {
                declared,
                available,
            });
        }

        // Overflow can only happen where usize is 32 bits; either way the
        // frame is far past any limit.
        let total = declared.checked_add(LENGTH_FIELD_LEN).unwrap_or(usize::MAX);
        if total > self.max_frame_size {
            warn!(
                skip = total,
                limit = self.max_frame_size,
                buffered = self.buffered_len(),
                "Skipping oversize frame"
            );
            self.skip = total;
            self.drain_skip(&mut decipher);
            return Err(FrameError::Oversized {
                declared: total,
                limit: self.max_frame_size,
            });
        }

        if !self.fill(total, &mut decipher) {
            return Ok(None);
        }

        let frame = self.plain.split_to(total).freeze();
        let header = read_header(&frame);
        trace!(header, len = total, "Frame assembled");
        Ok(Some(ClientPacket::new(header, frame.slice(LENGTH_FIELD_LEN..))))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn no_cipher(_: &mut [u8]) {}

    #[test]
    fn decode_rejects_short_buffers() {
        assert_eq!(
            decode(&[0, 0, 0, 2, 0]).unwrap_err(),
            FrameError::Truncated { available: 5 }
        );
    }

    #[test]
    fn decode_rejects_bad_lengths() {
        assert!(matches!(
            decode(&[0, 0, 0, 1, 0, 0]),
            Err(FrameError::InvalidLength { declared: 1, .. })
        ));
        assert!(matches!(
            decode(&[0, 0, 0, 9, 0, 0, 1]),
            Err(FrameError::InvalidLength { declared: 9, .. })
        ));
    }

    #[test]
    fn decode_reads_header_and_payload() {
        let frame = encode(53, b"\x00\x03abc");
        let mut packet = decode(&frame).unwrap();
        assert_eq!(packet.header(), 53);
        assert_eq!(packet.pop_string(), "abc");
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut bytes = encode(586, &[]).to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let packet = decode(&bytes).unwrap();
        assert_eq!(packet.header(), 586);
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn codec_waits_for_complete_frame() {
        let frame = encode(4000, b"hello");
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&frame[..7]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&frame[7..]);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.payload(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn assembler_splits_coalesced_frames() {
        let mut assembler = FrameAssembler::new(DEFAULT_MAX_FRAME_SIZE);
        let mut wire = encode(1, b"a").to_vec();
        wire.extend_from_slice(&encode(2, b"bc"));
        assembler.extend(&wire);

        assert_eq!(assembler.next_frame(no_cipher).unwrap().unwrap().header(), 1);
        assert_eq!(assembler.next_frame(no_cipher).unwrap().unwrap().header(), 2);
        assert!(assembler.next_frame(no_cipher).unwrap().is_none());
        assert_eq!(assembler.buffered_len(), 0);
    }

    #[test]
    fn assembler_joins_fragments() {
        let mut assembler = FrameAssembler::new(DEFAULT_MAX_FRAME_SIZE);
        let wire = encode(2602, b"fragmented payload");
        for byte in &wire[..wire.len() - 1] {
            assembler.extend(&[*byte]);
            assert!(assembler.next_frame(no_cipher).unwrap().is_none());
        }
        assembler.extend(&wire[wire.len() - 1..]);
        let packet = assembler.next_frame(no_cipher).unwrap().unwrap();
        assert_eq!(packet.payload(), b"fragmented payload");
    }

    #[test]
    fn assembler_skips_oversize_frame_and_recovers() {
        let mut assembler = FrameAssembler::new(64);
        let big = encode(9, &[0u8; 100]);
        let small = encode(10, b"ok");
        assembler.extend(&big[..40]);
        assert!(matches!(
            assembler.next_frame(no_cipher),
            Err(FrameError::Oversized { declared: 106, limit: 64 })
        ));
        assert!(assembler.next_frame(no_cipher).unwrap().is_none());
        assembler.extend(&big[40..]);
        assembler.extend(&small);
        let packet = assembler.next_frame(no_cipher).unwrap().unwrap();
        assert_eq!(packet.header(), 10);
    }

    #[test]
    fn assembler_skips_bytes_claimed_by_maximal_length() {
        let mut assembler = FrameAssembler::new(64);
        assembler.extend(&[0xFF, 0xFF, 0xFF, 0xFF, 0, 1]);
        match assembler.next_frame(no_cipher) {
            Err(FrameError::Oversized { declared, limit: 64 }) => {
                assert!(declared >= u32::MAX as usize);
            }
            other => panic!("expected oversize, got {other:?}"),
        }
        assembler.extend(&encode(10, b"ok"));
        assert!(assembler.next_frame(no_cipher).unwrap().is_none());
        assert_eq!(assembler.buffered_len(), 0);
    }

    #[test]
    fn assembler_deciphers_only_consumed_bytes() {
        let mut assembler = FrameAssembler::new(DEFAULT_MAX_FRAME_SIZE);
        let first = encode(1, b"x");
        let second: Vec<u8> = encode(2, b"y").iter().map(|b| b ^ 0xFF).collect();
        assembler.extend(&first);
        assembler.extend(&second);

        let mut seen = 0usize;
        let packet = assembler.next_frame(|buf| seen += buf.len()).unwrap().unwrap();
        assert_eq!(packet.header(), 1);
        assert_eq!(seen, first.len());

        // encryption switched on after the first frame
        let packet = assembler
            .next_frame(|buf| buf.iter_mut().for_each(|b| *b ^= 0xFF))
            .unwrap()
            .unwrap();
        assert_eq!(packet.header(), 2);
        assert_eq!(packet.payload(), b"y");
    }

    #[test]
    fn assembler_drops_buffer_on_zero_length() {
        let mut assembler = FrameAssembler::new(DEFAULT_MAX_FRAME_SIZE);
        assembler.extend(&[0, 0, 0, 0, 0, 0, 9, 9, 9]);
        assert!(matches!(
            assembler.next_frame(no_cipher),
            Err(FrameError::InvalidLength { declared: 0, .. })
        ));
        assert_eq!(assembler.buffered_len(), 0);
    }
}
