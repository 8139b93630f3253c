use num::bigint::BigUint;
use num::{Integer, One};
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use thiserror::Error;

use crate::bignum::{self, gen_prime, inv_mod};

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("prime factors must be distinct")]
    RepeatedPrime,
    #[error("public exponent shares a factor with phi(n)")]
    IncompatibleExponent,
    #[error(transparent)]
    Arithmetic(#[from] bignum::Error),
}

/// Textbook RSA key pair for one broadcast recipient
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecipientKey {
    /// One-based recipient index
    pub index: usize,
    #[serde(serialize_with = "bignum::serialize_decimal")]
    pub p: BigUint,
    #[serde(serialize_with = "bignum::serialize_decimal")]
    pub q: BigUint,
    #[serde(serialize_with = "bignum::serialize_decimal")]
    pub n: BigUint,
    #[serde(serialize_with = "bignum::serialize_decimal")]
    pub d: BigUint,
    #[serde(skip)]
    pub e: BigUint,
}

impl RecipientKey {
    /// Build a key pair from two primes and a public exponent
    ///
    /// errors: when p == q, or when e is not invertible mod phi(n)
    pub fn from_primes(index: usize, p: BigUint, q: BigUint, e: &BigUint) -> Result<Self, Error> {
        if p == q {
            return Err(Error::RepeatedPrime);
        }

        let one = BigUint::one();
        let phi = (&p - &one) * (&q - &one);
        if !e.gcd(&phi).is_one() {
            return Err(Error::IncompatibleExponent);
        }

        let d = inv_mod(e, &phi)?;
        let n = &p * &q;

        Ok(Self {
            index,
            p,
            q,
            n,
            d,
            e: e.clone(),
        })
    }

    /// c = m**e mod n
    pub fn encrypt(&self, m: &BigUint) -> BigUint {
        m.modpow(&self.e, &self.n)
    }

    /// m = c**d mod n
    pub fn decrypt(&self, c: &BigUint) -> BigUint {
        c.modpow(&self.d, &self.n)
    }

    /// Whether this modulus shares a factor with `other`
    pub fn shares_factor(&self, other: &BigUint) -> bool {
        !self.n.gcd(other).is_one()
    }
}

/// Random prime of `bits` bits with gcd(p - 1, e) == 1
pub fn gen_compatible_prime<R: CryptoRng + RngCore>(
    rng: &mut R,
    bits: u64,
    e: &BigUint,
) -> Result<BigUint, Error> {
    loop {
        let p = gen_prime(rng, bits)?;
        if (&p - BigUint::one()).gcd(e).is_one() {
            return Ok(p);
        }
    }
}

/// Two distinct primes usable with exponent `e`, whose product has exactly `modulus_bits` bits
///
/// errors: Arithmetic when `modulus_bits / 2` is too small for prime generation
pub fn gen_prime_pair<R: CryptoRng + RngCore>(
    rng: &mut R,
    modulus_bits: u64,
    e: &BigUint,
) -> Result<(BigUint, BigUint), Error> {
    let half = modulus_bits / 2;
    let p = gen_compatible_prime(rng, half, e)?;

    loop {
        let q = gen_compatible_prime(rng, half, e)?;
        if q != p && (&p * &q).bits() == modulus_bits {
            return Ok((p, q));
        }
    }
}
