//! AES block cipher wrapper and CBC mode.
//!
//! CBC here operates on already padded data; padding lives in `pkcs7`.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use thiserror::Error;

use crate::bytes::xor_assign;

/// AES block length in bytes
pub const BLOCK_LEN: usize = 16;

/// CBC IV length in bytes
pub const IV_LEN: usize = BLOCK_LEN;

/// Supported AES key sizes in bits
pub const KEY_SIZES: [usize; 3] = [128, 192, 256];

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("unsupported AES key length: {0} bytes")]
    InvalidKeySize(usize),
    #[error("data length {0} is not a multiple of the block length")]
    InvalidLength(usize),
    #[error("IV must be {IV_LEN} bytes, got {0}")]
    InvalidIv(usize),
}

/// AES with a key size chosen at runtime
#[derive(Clone)]
pub enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    /// Create a block cipher from a 16, 24 or 32 byte key
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        let invalid = |_| Error::InvalidKeySize(key.len());
        match key.len() {
            16 => Ok(Self::Aes128(Aes128::new_from_slice(key).map_err(invalid)?)),
            24 => Ok(Self::Aes192(Aes192::new_from_slice(key).map_err(invalid)?)),
            32 => Ok(Self::Aes256(Aes256::new_from_slice(key).map_err(invalid)?)),
            len => Err(Error::InvalidKeySize(len)),
        }
    }

    /// Encrypt a single block in place
    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }

    /// Decrypt a single block in place
    pub fn decrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.decrypt_block(block),
            Self::Aes192(c) => c.decrypt_block(block),
            Self::Aes256(c) => c.decrypt_block(block),
        }
    }
}

fn check_lengths(data: &[u8], iv: &[u8]) -> Result<(), Error> {
    if data.len() % BLOCK_LEN != 0 {
        return Err(Error::InvalidLength(data.len()));
    }
    if iv.len() != IV_LEN {
        return Err(Error::InvalidIv(iv.len()));
    }
    Ok(())
}

/// CBC-encrypt padded plaintext
///
/// C[i] = E(P[i] ^ C[i-1]), with C[-1] = IV
pub fn encrypt(cipher: &BlockCipher, plaintext: &[u8], iv: &[u8]) -> Result<Vec<u8>, Error> {
    check_lengths(plaintext, iv)?;

    let mut res = Vec::with_capacity(plaintext.len());
    let mut prev = [0_u8; BLOCK_LEN];
    prev.copy_from_slice(iv);

    for chunk in plaintext.chunks_exact(BLOCK_LEN) {
        let mut block = [0_u8; BLOCK_LEN];
        block.copy_from_slice(chunk);
        xor_assign(&mut block, &prev);
        cipher.encrypt_block(&mut block);
        res.extend_from_slice(&block);
        prev = block;
    }

    Ok(res)
}

/// CBC-decrypt ciphertext, leaving any padding in place
///
/// P[i] = D(C[i]) ^ C[i-1], with C[-1] = IV
pub fn decrypt(cipher: &BlockCipher, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>, Error> {
    check_lengths(ciphertext, iv)?;

    let mut res = Vec::with_capacity(ciphertext.len());
    let mut prev: &[u8] = iv;

    for chunk in ciphertext.chunks_exact(BLOCK_LEN) {
        let mut block = [0_u8; BLOCK_LEN];
        block.copy_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        xor_assign(&mut block, prev);
        res.extend_from_slice(&block);
        prev = chunk;
    }

    Ok(res)
}
