//! Inbound packet reader.
//!
//! A `ClientPacket` wraps the bytes of one unframed message (header id followed
//! by the payload) and hands out typed fields in order. Readers are permissive:
//! on underrun they log and return a zero/empty value instead of failing, which
//! keeps malformed legacy traffic from tearing down a connection.

use bytes::{Buf, Bytes};
use tracing::{trace, warn};

/// Size of the message id that prefixes every unframed body.
pub const HEADER_LEN: usize = 2;

/// One decoded inbound message.
#[derive(Debug, Clone)]
pub struct ClientPacket {
    header: u16,
    body: Bytes,
    position: usize,
}

impl ClientPacket {
    /// Wrap an unframed body. `body` starts with the 2-byte header id.
    pub fn new(header: u16, body: Bytes) -> Self {
        trace!(header, len = body.len(), "ClientPacket created");
        let position = HEADER_LEN.min(body.len());
        Self {
            header,
            body,
            position,
        }
    }

    /// Build a packet from a header id and payload, as if it had been unframed.
    pub fn from_parts(header: u16, payload: &[u8]) -> Self {
        let mut body = Vec::with_capacity(HEADER_LEN + payload.len());
        body.extend_from_slice(&header.to_be_bytes());
        body.extend_from_slice(payload);
        Self::new(header, Bytes::from(body))
    }

    pub fn header(&self) -> u16 {
        self.header
    }

    /// The bytes after the header id, regardless of the read cursor.
    pub fn payload(&self) -> &[u8] {
        &self.body[HEADER_LEN.min(self.body.len())..]
    }

    pub fn remaining_len(&self) -> usize {
        self.body.len().saturating_sub(self.position)
    }

    fn has(&self, n: usize) -> bool {
        self.remaining_len() >= n
    }

    fn cursor(&self) -> &[u8] {
        &self.body[self.position..]
    }

    /// Signed 32-bit big-endian int, `0` on underrun.
    pub fn pop_int(&mut self) -> i32 {
        if !self.has(4) {
            warn!(header = self.header, "Tried to read int beyond buffer end");
            return 0;
        }
        let value = self.cursor().get_i32();
        self.position += 4;
        value
    }

    /// Signed 16-bit big-endian short, `0` on underrun.
    pub fn pop_short(&mut self) -> i16 {
        if !self.has(2) {
            warn!(header = self.header, "Tried to read short beyond buffer end");
            return 0;
        }
        let value = self.cursor().get_i16();
        self.position += 2;
        value
    }

    /// One byte, `true` only for the canonical value `1`.
    pub fn pop_boolean(&mut self) -> bool {
        if !self.has(1) {
            warn!(header = self.header, "Tried to read boolean beyond buffer end");
            return false;
        }
        let value = self.body[self.position] == 1;
        self.position += 1;
        value
    }

    /// Signed 64-bit big-endian long, `0` on underrun.
    pub fn pop_long(&mut self) -> i64 {
        if !self.has(8) {
            warn!(header = self.header, "Tried to read long beyond buffer end");
            return 0;
        }
        let value = self.cursor().get_i64();
        self.position += 8;
        value
    }

    /// UTF-8 string with an unsigned 16-bit length prefix.
    ///
    /// Returns an empty string when the prefix or the declared body runs past
    /// the end of the buffer. A prefix that was read stays consumed even if its
    /// body is missing. Invalid UTF-8 is replaced rather than rejected.
    pub fn pop_string(&mut self) -> String {
        if !self.has(2) {
            warn!(header = self.header, "Tried to read string length beyond buffer end");
            return String::new();
        }
        let len = self.cursor().get_u16() as usize;
        self.position += 2;
        if !self.has(len) {
            warn!(
                header = self.header,
                declared = len,
                remaining = self.remaining_len(),
                "Invalid string length"
            );
            return String::new();
        }
        let start = self.position;
        let value = String::from_utf8_lossy(&self.body[start..start + len]).into_owned();
        self.position = start + len;
        value
    }

    /// Raw byte run, empty on underrun.
    pub fn pop_bytes(&mut self, len: usize) -> Bytes {
        if !self.has(len) {
            warn!(header = self.header, len, "Tried to read bytes beyond buffer end");
            return Bytes::new();
        }
        let value = self.body.slice(self.position..self.position + len);
        self.position += len;
        value
    }

    /// Legacy "double": a decimal-text string parsed to a float, `0.0` if the
    /// text is missing or not a number.
    pub fn pop_double(&mut self) -> f64 {
        let text = self.pop_string();
        match text.trim().parse::<f64>() {
            Ok(value) if !value.is_nan() => value,
            _ => {
                warn!(header = self.header, text = %text, "Not a valid double");
                0.0
            }
        }
    }

    /// Whole body, header included, as lowercase hex.
    pub fn dump_hex(&self) -> String {
        hex::encode(&self.body)
    }
}
