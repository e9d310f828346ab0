//! Arbitrary-precision helpers shared by RSA and Diffie-Hellman.
//!
//! Randomness comes from whatever `RngCore` the caller passes in; production
//! code hands in `rand::rng()`, tests may pass a seeded generator.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;

use crate::error::CryptoError;

/// Fermat rounds run against every prime candidate.
pub const PRIME_TEST_ROUNDS: usize = 5;

/// Candidates drawn before prime generation gives up.
pub const MAX_PRIME_ATTEMPTS: usize = 500;

/// `base^exponent mod modulus` by square-and-multiply.
///
/// A modulus of one yields zero, an exponent of zero yields one.
pub fn mod_pow(
    base: &BigUint,
    exponent: &BigUint,
    modulus: &BigUint,
) -> Result<BigUint, CryptoError> {
    if modulus.is_zero() {
        return Err(CryptoError::ZeroModulus);
    }
    if modulus.is_one() {
        return Ok(BigUint::zero());
    }
    if exponent.is_zero() {
        return Ok(BigUint::one());
    }

    let mut base = base % modulus;
    if base.is_zero() {
        return Ok(base);
    }

    let mut result = BigUint::one();
    for i in 0..exponent.bits() {
        if exponent.bit(i) {
            result = (result * &base) % modulus;
        }
        base = (&base * &base) % modulus;
    }
    Ok(result)
}

/// Uniform-ish integer in `[min, max]`, both ends inclusive.
///
/// Draws enough random bytes to cover the range and reduces modulo its size,
/// which is the distribution the legacy client uses.
pub fn random_in_range<R: RngCore + ?Sized>(
    rng: &mut R,
    min: &BigUint,
    max: &BigUint,
) -> Result<BigUint, CryptoError> {
    if min > max {
        return Err(CryptoError::InvalidKey(format!(
            "empty random range [{min}, {max}]"
        )));
    }

    let range = max - min + BigUint::one();
    let mut bytes = vec![0u8; range.bits().div_ceil(8) as usize];
    rng.fill_bytes(&mut bytes);
    Ok(min + BigUint::from_bytes_be(&bytes) % range)
}

/// Fermat probable-prime test with `rounds` random witnesses in `[2, n-2]`.
pub fn is_probable_prime<R: RngCore + ?Sized>(
    rng: &mut R,
    n: &BigUint,
    rounds: usize,
) -> Result<bool, CryptoError> {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if n <= &BigUint::one() {
        return Ok(false);
    }
    if n <= &three {
        return Ok(true);
    }
    if !n.bit(0) {
        return Ok(false);
    }

    let n_minus_one = n - BigUint::one();
    let upper = n - &two;
    for _ in 0..rounds {
        let witness = random_in_range(rng, &two, &upper)?;
        if !mod_pow(&witness, &n_minus_one, n)?.is_one() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Random odd probable prime with exactly `bits` bits.
pub fn generate_probable_prime<R: RngCore + ?Sized>(
    rng: &mut R,
    bits: u64,
) -> Result<BigUint, CryptoError> {
    if bits < 2 {
        return Err(CryptoError::InvalidKey(format!(
            "prime bit length must be at least 2, got {bits}"
        )));
    }

    let min = BigUint::one() << (bits - 1);
    let max = (BigUint::one() << bits) - BigUint::one();

    for _ in 0..MAX_PRIME_ATTEMPTS {
        let mut candidate = random_in_range(rng, &min, &max)?;
        if !candidate.bit(0) {
            candidate += BigUint::one();
        }
        if is_probable_prime(rng, &candidate, PRIME_TEST_ROUNDS)? {
            return Ok(candidate);
        }
    }

    Err(CryptoError::PrimeGenerationExhausted {
        attempts: MAX_PRIME_ATTEMPTS,
    })
}

/// Big-endian magnitude with no leading zero byte. Zero maps to an empty vec.
pub fn to_unsigned_bytes(value: &BigUint) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_bytes_be()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn big(v: u64) -> BigUint {
        BigUint::from(v)
    }

    #[test]
    fn mod_pow_matches_builtin() {
        let base = big(0xDEAD_BEEF);
        let exp = big(65_537);
        let modulus = big(1_000_000_007);
        assert_eq!(
            mod_pow(&base, &exp, &modulus).unwrap(),
            base.modpow(&exp, &modulus)
        );
    }

    #[test]
    fn mod_pow_edge_cases() {
        assert_eq!(mod_pow(&big(5), &big(3), &big(0)), Err(CryptoError::ZeroModulus));
        assert_eq!(mod_pow(&big(5), &big(3), &big(1)).unwrap(), big(0));
        assert_eq!(mod_pow(&big(5), &big(0), &big(7)).unwrap(), big(1));
        assert_eq!(mod_pow(&big(14), &big(3), &big(7)).unwrap(), big(0));
    }

    #[test]
    fn random_in_range_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let v = random_in_range(&mut rng, &big(10), &big(20)).unwrap();
            assert!(v >= big(10) && v <= big(20));
        }
        assert!(random_in_range(&mut rng, &big(3), &big(2)).is_err());
    }

    #[test]
    fn small_primes_are_recognised() {
        let mut rng = StdRng::seed_from_u64(1);
        for p in [2u64, 3, 5, 7, 11, 13, 7919, 1_000_000_007] {
            assert!(is_probable_prime(&mut rng, &big(p), PRIME_TEST_ROUNDS).unwrap(), "{p}");
        }
        for c in [0u64, 1, 4, 9, 21, 7917, 1_000_000_008] {
            assert!(!is_probable_prime(&mut rng, &big(c), PRIME_TEST_ROUNDS).unwrap(), "{c}");
        }
    }

    #[test]
    fn generated_prime_has_requested_width() {
        let mut rng = StdRng::seed_from_u64(42);
        let p = generate_probable_prime(&mut rng, 128).unwrap();
        assert_eq!(p.bits(), 128);
        assert!(p.bit(0));
        assert!(is_probable_prime(&mut rng, &p, 20).unwrap());
    }

    #[test]
    fn unsigned_bytes_drop_leading_zero() {
        assert!(to_unsigned_bytes(&big(0)).is_empty());
        assert_eq!(to_unsigned_bytes(&big(0x80)), vec![0x80]);
        assert_eq!(to_unsigned_bytes(&big(0x0102)), vec![0x01, 0x02]);
    }
}
