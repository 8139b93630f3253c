use rand::RngCore;
use thiserror::Error;

mod cbc;

pub use cbc::*;

/// Errors for the padding oracle and the byte-recovery attack
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("previous and target blocks must be the same non-zero length up to 255 bytes")]
    BlockLength,
    #[error("no guess produced valid padding for byte {position}")]
    OracleExhausted { position: usize },
    #[error("invalid padding byte {0:#04x} on the recovered plaintext")]
    InvalidPadding(u8),
    #[error("ciphertext length {0} is not a non-zero multiple of the block length")]
    CiphertextLength(usize),
}

/// Black-box padding oracle
///
/// Models a remote service that leaks, through error messages or timing,
/// whether a ciphertext decrypts to validly padded plaintext.
pub trait PaddingOracle {
    /// Block length of the underlying cipher
    fn block_len(&self) -> usize;

    /// Whether `candidate` decrypts to correctly padded plaintext
    ///
    /// The first block of `candidate` acts as the IV for the rest.
    fn is_valid_padding(&self, candidate: &[u8]) -> bool;
}

impl<O: PaddingOracle + ?Sized> PaddingOracle for &O {
    fn block_len(&self) -> usize {
        (**self).block_len()
    }

    fn is_valid_padding(&self, candidate: &[u8]) -> bool {
        (**self).is_valid_padding(candidate)
    }
}

/// Generate a random AES key of `key_bits` bits
pub fn gen_rand_key<R: RngCore + ?Sized>(rng: &mut R, key_bits: usize) -> Vec<u8> {
    let mut key = vec![0_u8; key_bits / 8];
    rng.fill_bytes(&mut key);
    key
}

/// Generate a random AES-CBC IV
pub fn gen_rand_iv<R: RngCore + ?Sized>(rng: &mut R) -> [u8; crate::cbc::IV_LEN] {
    let mut iv = [0_u8; crate::cbc::IV_LEN];
    rng.fill_bytes(&mut iv);
    iv
}
