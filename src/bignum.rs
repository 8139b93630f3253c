//! Exact arbitrary-precision helpers for the RSA side of the simulations.
//!
//! Nothing here is constant-time. Results are exact for operands of any
//! size `num::BigUint` can hold.

use glass_pumpkin::prime;
use num::bigint::{BigInt, BigUint};
use num::{Integer, One, Zero};
use rand::{CryptoRng, RngCore};
use serde::Serializer;
use thiserror::Error;

/// Smallest prime size `gen_prime` accepts
pub const MIN_PRIME_BITS: u64 = 128;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("value is not invertible modulo the given modulus")]
    NotInvertible,
    #[error("modulus must be non-zero")]
    ZeroModulus,
    #[error("root degree must be non-zero")]
    ZeroRootDegree,
    #[error("CRT needs one residue per modulus (residues: {residues}, moduli: {moduli})")]
    CrtMismatch { residues: usize, moduli: usize },
    #[error("cannot generate a {bits}-bit prime, at least {} bits are needed", MIN_PRIME_BITS)]
    PrimeBitLength { bits: u64 },
}

/// Modular inverse of `a` modulo `m` using the extended Euclidean algorithm
///
/// errors: NotInvertible when gcd(a, m) != 1
pub fn inv_mod(a: &BigUint, m: &BigUint) -> Result<BigUint, Error> {
    if m.is_zero() {
        return Err(Error::ZeroModulus);
    }

    let (mut old_r, mut r) = (BigInt::from(a % m), BigInt::from(m.clone()));
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());

    while !r.is_zero() {
        let q = &old_r / &r;

        let next_r = &old_r - &q * &r;
        old_r = core::mem::replace(&mut r, next_r);

        let next_s = &old_s - &q * &s;
        old_s = core::mem::replace(&mut s, next_s);
    }

    if !old_r.is_one() {
        return Err(Error::NotInvertible);
    }

    old_s
        .mod_floor(&BigInt::from(m.clone()))
        .to_biguint()
        .ok_or(Error::NotInvertible)
}

/// Integer n-th root of `x`
///
/// Returns the floor of the root, and whether it is exact (root**n == x)
pub fn nth_root(x: &BigUint, n: u32) -> Result<(BigUint, bool), Error> {
    if n == 0 {
        return Err(Error::ZeroRootDegree);
    }

    let root = x.nth_root(n);
    let exact = &root.pow(n) == x;

    Ok((root, exact))
}

/// Solve x = residues[i] (mod moduli[i]) for pairwise-coprime moduli
///
/// Returns the unique solution below the product of the moduli, and the product itself
pub fn crt(residues: &[BigUint], moduli: &[BigUint]) -> Result<(BigUint, BigUint), Error> {
    if residues.len() != moduli.len() || moduli.is_empty() {
        return Err(Error::CrtMismatch {
            residues: residues.len(),
            moduli: moduli.len(),
        });
    }

    let product = moduli.iter().fold(BigUint::one(), |acc, n| acc * n);

    let mut x = BigUint::zero();
    for (r, n) in residues.iter().zip(moduli.iter()) {
        if n.is_zero() {
            return Err(Error::ZeroModulus);
        }
        // m_i = N / n_i, y_i = m_i**-1 mod n_i
        let m_i = &product / n;
        let y_i = inv_mod(&(&m_i % n), n)?;
        x += r * &m_i * y_i;
    }

    Ok((x % &product, product))
}

/// Random prime of exactly `bits` bits
///
/// errors: PrimeBitLength when `bits` is below MIN_PRIME_BITS
pub fn gen_prime<R: CryptoRng + RngCore>(rng: &mut R, bits: u64) -> Result<BigUint, Error> {
    if bits < MIN_PRIME_BITS {
        return Err(Error::PrimeBitLength { bits });
    }
    prime::from_rng(bits as usize, rng).map_err(|_| Error::PrimeBitLength { bits })
}

/// Parse an unsigned decimal string
pub fn parse_decimal(s: &str) -> Option<BigUint> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
}

/// Serialize a big integer as a decimal string
pub fn serialize_decimal<S: Serializer>(n: &BigUint, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&n.to_str_radix(10))
}

/// Serialize an optional big integer as a decimal string or null
pub fn serialize_decimal_opt<S: Serializer>(n: &Option<BigUint>, s: S) -> Result<S::Ok, S::Error> {
    match n {
        Some(n) => serialize_decimal(n, s),
        None => s.serialize_none(),
    }
}

/// Serialize a list of big integers as decimal strings
pub fn serialize_decimal_seq<S: Serializer>(ns: &[BigUint], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(ns.iter().map(|n| n.to_str_radix(10)))
}
