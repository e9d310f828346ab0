//! Outbound packet composer.
//!
//! Writes a 4-byte length placeholder and the 2-byte header up front, then
//! appends fields. [`PacketComposer::finish`] patches the length field to the
//! number of bytes that follow it and hands back the wire frame.
//!
//! Note the outbound double is little-endian IEEE754, unlike the inbound
//! decimal-text double. The legacy client expects exactly this.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::FrameError;

/// Initial buffer size for a new composer.
const INITIAL_CAPACITY: usize = 1024;

/// Length prefix size.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Builder for one outbound frame.
#[derive(Debug, Clone)]
pub struct PacketComposer {
    header: u16,
    buffer: BytesMut,
}

impl PacketComposer {
    pub fn new(header: u16) -> Self {
        let mut buffer = BytesMut::with_capacity(INITIAL_CAPACITY);
        buffer.put_u32(0);
        buffer.put_u16(header);
        Self { header, buffer }
    }

    pub fn header(&self) -> u16 {
        self.header
    }

    /// Bytes written so far, length placeholder included.
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    // Doubles capacity whenever the next write would overflow.
    fn ensure_capacity(&mut self, additional: usize) {
        let required = self.buffer.len() + additional;
        if required > self.buffer.capacity() {
            let target = required.max(self.buffer.capacity() * 2);
            self.buffer.reserve(target - self.buffer.len());
        }
    }

    pub fn append_raw_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.ensure_capacity(bytes.len());
        self.buffer.put_slice(bytes);
        self
    }

    /// UTF-8 string with a 16-bit big-endian length prefix.
    pub fn append_string(&mut self, value: &str) -> Result<&mut Self, FrameError> {
        let bytes = value.as_bytes();
        let len = u16::try_from(bytes.len()).map_err(|_| FrameError::StringTooLong(bytes.len()))?;
        self.ensure_capacity(2 + bytes.len());
        self.buffer.put_u16(len);
        self.buffer.put_slice(bytes);
        Ok(self)
    }

    pub fn append_int(&mut self, value: i32) -> &mut Self {
        self.ensure_capacity(4);
        self.buffer.put_i32(value);
        self
    }

    pub fn append_short(&mut self, value: i16) -> &mut Self {
        self.ensure_capacity(2);
        self.buffer.put_i16(value);
        self
    }

    pub fn append_byte(&mut self, value: i8) -> &mut Self {
        self.ensure_capacity(1);
        self.buffer.put_i8(value);
        self
    }

    pub fn append_boolean(&mut self, value: bool) -> &mut Self {
        self.ensure_capacity(1);
        self.buffer.put_u8(u8::from(value));
        self
    }

    /// One UTF-16 code unit, big-endian.
    pub fn append_char(&mut self, value: u16) -> &mut Self {
        self.ensure_capacity(2);
        self.buffer.put_u16(value);
        self
    }

    /// Every UTF-16 code unit of `value`, without a length prefix.
    pub fn append_chars(&mut self, value: &str) -> &mut Self {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.ensure_capacity(units.len() * 2);
        for unit in units {
            self.buffer.put_u16(unit);
        }
        self
    }

    /// 8-byte little-endian IEEE754.
    pub fn append_double(&mut self, value: f64) -> &mut Self {
        self.ensure_capacity(8);
        self.buffer.put_f64_le(value);
        self
    }

    /// Embed another finished frame verbatim.
    pub fn append_response(&mut self, other: PacketComposer) -> &mut Self {
        let frame = other.finish();
        self.append_raw_bytes(&frame)
    }

    /// Patch the length field and return the wire frame.
    pub fn finish(mut self) -> Bytes {
        let length = (self.buffer.len() - LENGTH_FIELD_LEN) as u32;
        self.buffer[..LENGTH_FIELD_LEN].copy_from_slice(&length.to_be_bytes());
        trace!(header = self.header, length, "Composed frame");
        self.buffer.freeze()
    }
}
