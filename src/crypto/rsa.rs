//! Textbook RSA with PKCS#1 v1.5 style block padding.
//!
//! Kept deliberately small and bit-compatible with the legacy client:
//! - `encrypt` / `decrypt`: public / private key, padding type 2 (random bytes)
//! - `sign` / `verify`: private / public key, padding type 1 (`0xFF` bytes)
//!
//! Input longer than one block is split into `block_size - 11` byte chunks,
//! each padded and exponentiated on its own.

use num_bigint::BigUint;
use rand::{Rng, RngCore};
use tracing::trace;

use crate::crypto::bigint::{mod_pow, to_unsigned_bytes};
use crate::error::CryptoError;

/// Bytes of padding overhead per block.
pub const PADDING_OVERHEAD: usize = 11;

const PAD_TYPE_SIGNATURE: u8 = 1;
const PAD_TYPE_ENCRYPTION: u8 = 2;

#[derive(Clone, Copy)]
enum Key {
    Public,
    Private,
}

/// RSA key material plus the derived block size.
#[derive(Clone)]
pub struct RsaCrypto {
    e: BigUint,
    n: BigUint,
    d: Option<BigUint>,
    block_size: usize,
}

impl std::fmt::Debug for RsaCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaCrypto")
            .field("modulus_bits", &self.n.bits())
            .field("block_size", &self.block_size)
            .field("has_private_key", &self.d.is_some())
            .finish()
    }
}

fn parse_hex(label: &str, value: &str) -> Result<BigUint, CryptoError> {
    BigUint::parse_bytes(value.trim().as_bytes(), 16)
        .ok_or_else(|| CryptoError::InvalidKey(format!("{label} is not valid hex")))
}

impl RsaCrypto {
    /// Build from hex encoded `e`, `n` and optional `d`.
    pub fn from_hex(e: &str, n: &str, d: Option<&str>) -> Result<Self, CryptoError> {
        let e = parse_hex("public exponent", e)?;
        let n = parse_hex("modulus", n)?;
        let d = d
            .filter(|d| !d.trim().is_empty())
            .map(|d| parse_hex("private exponent", d))
            .transpose()?;

        let block_size = n.bits().div_ceil(8) as usize;
        if block_size <= PADDING_OVERHEAD {
            return Err(CryptoError::InvalidKey(format!(
                "modulus of {} bits is too small for padding",
                n.bits()
            )));
        }

        Ok(Self {
            e,
            n,
            d,
            block_size,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn has_private_key(&self) -> bool {
        self.d.is_some()
    }

    /// Public-key encryption, padding type 2.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.process_encrypt(data, Key::Public, PAD_TYPE_ENCRYPTION)
    }

    /// Private-key decryption, padding type 2.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.process_decrypt(data, Key::Private, PAD_TYPE_ENCRYPTION)
    }

    /// Private-key signature, padding type 1.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.process_encrypt(data, Key::Private, PAD_TYPE_SIGNATURE)
    }

    /// Public-key signature recovery, padding type 1.
    pub fn verify(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.process_decrypt(data, Key::Public, PAD_TYPE_SIGNATURE)
    }

    fn apply(&self, block: &BigUint, key: Key) -> Result<BigUint, CryptoError> {
        match key {
            Key::Public => mod_pow(block, &self.e, &self.n),
            Key::Private => {
                let d = self.d.as_ref().ok_or(CryptoError::PrivateKeyUnavailable)?;
                mod_pow(block, d, &self.n)
            }
        }
    }

    fn process_encrypt(&self, data: &[u8], key: Key, pad_type: u8) -> Result<Vec<u8>, CryptoError> {
        if matches!(key, Key::Private) && self.d.is_none() {
            return Err(CryptoError::PrivateKeyUnavailable);
        }

        let chunk_len = self.block_size - PADDING_OVERHEAD;
        let mut out = Vec::with_capacity(data.len().div_ceil(chunk_len) * self.block_size);
        let mut rng = rand::rng();

        for chunk in data.chunks(chunk_len) {
            let padded = pkcs1_pad(chunk, self.block_size, pad_type, &mut rng);
            let value = self.apply(&BigUint::from_bytes_be(&padded), key)?;
            let bytes = to_unsigned_bytes(&value);
            out.resize(out.len() + self.block_size - bytes.len(), 0);
            out.extend_from_slice(&bytes);
        }

        trace!(input = data.len(), output = out.len(), pad_type, "RSA blocks written");
        Ok(out)
    }

    fn process_decrypt(&self, data: &[u8], key: Key, pad_type: u8) -> Result<Vec<u8>, CryptoError> {
        if data.len() % self.block_size != 0 {
            return Err(CryptoError::InvalidBlockLength {
                block_size: self.block_size,
                length: data.len(),
            });
        }

        let mut out = Vec::with_capacity(data.len());
        for block in data.chunks(self.block_size) {
            let value = self.apply(&BigUint::from_bytes_be(block), key)?;
            let raw = to_unsigned_bytes(&value);
            let unpadded = pkcs1_unpad(&raw, self.block_size, pad_type)?;
            out.extend_from_slice(unpadded);
        }
        Ok(out)
    }
}

/// Lay out `[0, pad_type, filler.., 0, data..]` in a block of `n` bytes.
///
/// `data` must be at most `n - 11` bytes.
pub(crate) fn pkcs1_pad<R: RngCore + ?Sized>(
    data: &[u8],
    n: usize,
    pad_type: u8,
    rng: &mut R,
) -> Vec<u8> {
    let mut block = vec![0u8; n];
    let data_start = n - data.len();
    block[data_start..].copy_from_slice(data);

    // block[data_start - 1] stays zero as the separator
    for byte in &mut block[2..data_start - 1] {
        *byte = if pad_type == PAD_TYPE_ENCRYPTION {
            rng.random_range(1..=255u8)
        } else {
            0xFF
        };
    }
    block[1] = pad_type;
    block
}

/// Strip padding from a block whose leading zero bytes were already dropped.
pub(crate) fn pkcs1_unpad(block: &[u8], n: usize, pad_type: u8) -> Result<&[u8], CryptoError> {
    let mut i = block.iter().take_while(|b| **b == 0).count();

    let found = block.get(i).copied().unwrap_or(0);
    if block.len() - i != n - 1 || found != pad_type {
        return Err(CryptoError::PaddingMismatch {
            expected: pad_type,
            found,
        });
    }

    i += 1;
    while block.get(i).is_some_and(|b| *b != 0) {
        i += 1;
    }
    if i >= block.len() {
        return Err(CryptoError::MalformedPadding);
    }

    Ok(&block[i + 1..])
}
