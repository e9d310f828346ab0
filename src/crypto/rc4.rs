//! RC4 keystream, byte-for-byte what the legacy client runs.
//!
//! One instance serves both directions of a session, so the keystream position
//! is shared between inbound and outbound traffic and must only ever move
//! forward.

use crate::error::CryptoError;

pub struct Rc4 {
    i: u8,
    j: u8,
    table: [u8; 256],
}

impl std::fmt::Debug for Rc4 {
    // the permutation table is key material
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rc4").finish_non_exhaustive()
    }
}

impl Rc4 {
    /// Key-schedule a new cipher.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }

        let mut table = [0u8; 256];
        for (slot, value) in table.iter_mut().zip(0u8..=255) {
            *slot = value;
        }

        let mut j = 0u8;
        for i in 0..256usize {
            j = j.wrapping_add(table[i]).wrapping_add(key[i % key.len()]);
            table.swap(i, j as usize);
        }

        Ok(Self { i: 0, j: 0, table })
    }

    /// XOR `bytes` with the next `bytes.len()` keystream bytes, in place.
    pub fn parse(&mut self, bytes: &mut [u8]) {
        for byte in bytes.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.table[self.i as usize]);
            self.table.swap(self.i as usize, self.j as usize);
            let k = self.table[self.i as usize].wrapping_add(self.table[self.j as usize]);
            *byte ^= self.table[k as usize];
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn apply(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        Rc4::new(key).unwrap().parse(&mut out);
        out
    }

    #[test]
    fn known_vectors() {
        assert_eq!(apply(b"Key", b"Plaintext"), hex::decode("bbf316e8d940af0ad3").unwrap());
        assert_eq!(apply(b"Wiki", b"pedia"), hex::decode("1021bf0420").unwrap());
        assert_eq!(
            apply(b"Secret", b"Attack at dawn"),
            hex::decode("45a01f645fc35b383552544b9bf5").unwrap()
        );
    }

    #[test]
    fn keystream_continues_across_calls() {
        let whole = apply(b"Key", b"Plaintext");
        let mut cipher = Rc4::new(b"Key").unwrap();
        let mut head = b"Plain".to_vec();
        let mut tail = b"text".to_vec();
        cipher.parse(&mut head);
        cipher.parse(&mut tail);
        assert_eq!([head, tail].concat(), whole);
    }

    #[test]
    fn empty_key_is_rejected() {
        assert_eq!(Rc4::new(&[]).err(), Some(CryptoError::EmptyKey));
    }
}
