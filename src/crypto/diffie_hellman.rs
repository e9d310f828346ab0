//! Diffie-Hellman key agreement over RSA-wrapped integers.
//!
//! Integers travel as the decimal text of the value, run through RSA and hex
//! encoded in lowercase. The server signs with its private key; a client,
//! holding only the public key, encrypts instead. Decoding accepts both by
//! trying private-key decryption first and falling back to public-key
//! verification.

use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::Zero;
use tracing::debug;

use crate::crypto::bigint::{generate_probable_prime, mod_pow, to_unsigned_bytes};
use crate::crypto::rsa::RsaCrypto;
use crate::error::constants::{ERR_EMPTY_PUBLIC_KEY, ERR_EMPTY_SHARED_KEY, ERR_ZERO_PEER_KEY};
use crate::error::CryptoError;

/// Bit length of the prime and generator.
pub const DH_PRIMES_BIT_SIZE: u64 = 128;

/// Bit length of the private exponent.
pub const DH_KEY_BIT_SIZE: u64 = 128;

/// One side of a DH exchange.
///
/// `Clone` so the expensive steps can run on a worker thread against a copy.
#[derive(Clone)]
pub struct DiffieHellman {
    rsa: Arc<RsaCrypto>,
    prime: BigUint,
    generator: BigUint,
    private_key: BigUint,
    public_key: BigUint,
    adopted: bool,
}

impl std::fmt::Debug for DiffieHellman {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffieHellman")
            .field("prime", &self.prime)
            .field("generator", &self.generator)
            .field("public_key", &self.public_key)
            .field("adopted", &self.adopted)
            .finish_non_exhaustive()
    }
}

fn validate_parameters(prime: &BigUint, generator: &BigUint) -> Result<(), CryptoError> {
    if prime <= &BigUint::from(2u32) {
        return Err(CryptoError::InvalidDhParameters(format!(
            "prime must be greater than 2, got {prime}"
        )));
    }
    if generator >= prime {
        return Err(CryptoError::InvalidDhParameters(format!(
            "generator {generator} must be below prime {prime}"
        )));
    }
    Ok(())
}

impl DiffieHellman {
    /// Fresh parameters and key pair.
    pub fn new(rsa: Arc<RsaCrypto>) -> Result<Self, CryptoError> {
        let mut rng = rand::rng();
        let mut prime = generate_probable_prime(&mut rng, DH_PRIMES_BIT_SIZE)?;
        let mut generator = generate_probable_prime(&mut rng, DH_PRIMES_BIT_SIZE)?;
        if generator > prime {
            std::mem::swap(&mut prime, &mut generator);
        }
        validate_parameters(&prime, &generator)?;

        let mut dh = Self {
            rsa,
            prime,
            generator,
            private_key: BigUint::zero(),
            public_key: BigUint::zero(),
            adopted: false,
        };
        let (private_key, public_key) = key_pair(&dh.prime, &dh.generator)?;
        dh.private_key = private_key;
        dh.public_key = public_key;
        Ok(dh)
    }

    pub fn prime(&self) -> &BigUint {
        &self.prime
    }

    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    pub fn public_key(&self) -> &BigUint {
        &self.public_key
    }

    pub fn signed_prime(&self) -> Result<String, CryptoError> {
        encode_signed(&self.rsa, &self.prime)
    }

    pub fn signed_generator(&self) -> Result<String, CryptoError> {
        encode_signed(&self.rsa, &self.generator)
    }

    /// Our public value, signed with the RSA private key (server side).
    pub fn signed_public_key(&self) -> Result<String, CryptoError> {
        encode_signed(&self.rsa, &self.public_key)
    }

    /// Our public value, encrypted with the RSA public key (client side).
    pub fn encrypted_public_key(&self) -> Result<String, CryptoError> {
        encode_encrypted(&self.rsa, &self.public_key)
    }

    /// Adopt the peer's prime and generator, then derive a new key pair.
    ///
    /// Allowed once per instance. Nothing changes if any step fails.
    pub fn do_handshake(
        &mut self,
        signed_prime: &str,
        signed_generator: &str,
    ) -> Result<(), CryptoError> {
        if self.adopted {
            return Err(CryptoError::ParametersAlreadyAdopted);
        }

        let prime = decode_integer(&self.rsa, signed_prime)?;
        let generator = decode_integer(&self.rsa, signed_generator)?;
        validate_parameters(&prime, &generator)?;
        let (private_key, public_key) = key_pair(&prime, &generator)?;

        self.prime = prime;
        self.generator = generator;
        self.private_key = private_key;
        self.public_key = public_key;
        self.adopted = true;
        debug!(prime_bits = self.prime.bits(), "Adopted peer DH parameters");
        Ok(())
    }

    /// Shared secret for the peer's wrapped public value, as unsigned
    /// big-endian bytes with no leading zero.
    pub fn shared_key(&self, peer_public_key: &str) -> Result<Vec<u8>, CryptoError> {
        if peer_public_key.is_empty() {
            return Err(CryptoError::InvalidKey(ERR_EMPTY_PUBLIC_KEY.into()));
        }

        let peer = decode_integer(&self.rsa, peer_public_key)?;
        if peer.is_zero() {
            return Err(CryptoError::InvalidKey(ERR_ZERO_PEER_KEY.into()));
        }

        let shared = to_unsigned_bytes(&mod_pow(&peer, &self.private_key, &self.prime)?);
        if shared.is_empty() {
            return Err(CryptoError::InvalidKey(ERR_EMPTY_SHARED_KEY.into()));
        }
        Ok(shared)
    }
}

/// Private exponent and matching public value for `prime` and `generator`.
fn key_pair(prime: &BigUint, generator: &BigUint) -> Result<(BigUint, BigUint), CryptoError> {
    let private_key = generate_probable_prime(&mut rand::rng(), DH_KEY_BIT_SIZE)?;
    let public_key = mod_pow(generator, &private_key, prime)?;
    if public_key.is_zero() {
        return Err(CryptoError::InvalidKey("generated public key is zero".into()));
    }
    Ok((private_key, public_key))
}

fn encode_signed(rsa: &RsaCrypto, value: &BigUint) -> Result<String, CryptoError> {
    Ok(hex::encode(rsa.sign(value.to_str_radix(10).as_bytes())?))
}

fn encode_encrypted(rsa: &RsaCrypto, value: &BigUint) -> Result<String, CryptoError> {
    Ok(hex::encode(rsa.encrypt(value.to_str_radix(10).as_bytes())?))
}

/// Unwrap an RSA-processed, hex encoded decimal integer.
pub fn decode_integer(rsa: &RsaCrypto, encoded: &str) -> Result<BigUint, CryptoError> {
    if encoded.is_empty() {
        return Err(CryptoError::InvalidEncoding("empty integer".into()));
    }
    let bytes =
        hex::decode(encoded).map_err(|e| CryptoError::InvalidEncoding(format!("hex: {e}")))?;

    let text = match rsa.decrypt(&bytes) {
        Ok(text) => text,
        Err(_) => rsa.verify(&bytes)?,
    };

    BigUint::parse_bytes(&text, 10)
        .ok_or_else(|| CryptoError::InvalidEncoding("not a decimal integer".into()))
}
