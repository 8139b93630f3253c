use std::sync::atomic::{AtomicU64, Ordering};

use crate::cbc::{BlockCipher, BLOCK_LEN};
use crate::{bytes, pkcs7};

use super::{Error, PaddingOracle};

/// Padding oracle backed by a secret AES key
///
/// Stands in for a remote decryption service. The key never leaves the
/// oracle: the attack only ever sees the validity bit.
pub struct CbcPaddingOracle {
    cipher: BlockCipher,
    queries: AtomicU64,
}

impl CbcPaddingOracle {
    /// Create a new CBC padding oracle over the given AES key
    pub fn new(key: &[u8]) -> Result<Self, crate::cbc::Error> {
        Ok(Self {
            cipher: BlockCipher::new(key)?,
            queries: AtomicU64::new(0),
        })
    }

    /// Number of padding checks answered so far
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

impl PaddingOracle for CbcPaddingOracle {
    fn block_len(&self) -> usize {
        BLOCK_LEN
    }

    fn is_valid_padding(&self, candidate: &[u8]) -> bool {
        self.queries.fetch_add(1, Ordering::Relaxed);

        if candidate.len() < 2 * BLOCK_LEN {
            return false;
        }

        let (iv, ciphertext) = candidate.split_at(BLOCK_LEN);
        match crate::cbc::decrypt(&self.cipher, ciphertext, iv) {
            Ok(pt) => pkcs7::validate(&pt, BLOCK_LEN).is_ok(),
            Err(_) => false,
        }
    }
}

/// A byte of the intermediate state recovered through the oracle
#[derive(Clone, Debug, PartialEq)]
pub struct ByteRecovery {
    /// Position of the byte inside the block
    pub position: usize,
    /// Padding value forced while guessing this byte
    pub padding: u8,
    /// Crafted byte value the oracle accepted
    pub guess: u8,
    /// Recovered D(target)[position]
    pub intermediate: u8,
    /// Valid-padding hits rejected as longer-padding false positives
    pub false_positives: usize,
    /// Oracle queries spent on this byte
    pub queries: usize,
}

/// Progress events emitted while attacking one block
#[derive(Debug)]
pub enum AttackEvent<'a> {
    /// About to guess the byte at `position` with padding `padding`
    ByteStart { position: usize, padding: u8 },
    /// Byte recovered
    ByteFound(&'a ByteRecovery),
}

/// Recover the intermediate state D(target) of one ciphertext block
///
/// Bytes are solved last-first. For padding length p, crafted bytes after
/// the guessed position are set to intermediate ^ p, then every value of the
/// guessed byte is submitted as (crafted || target). The first value with
/// valid padding wins, except that for p == 1 a hit is only kept if it
/// survives a mutation of the byte before it (a longer padding would not).
///
/// `observe` is called before each byte (a cancellation checkpoint) and
/// after each recovered byte; an error from it aborts the attack.
pub fn recover_intermediate<O, E, F>(
    oracle: &O,
    prev: &[u8],
    target: &[u8],
    mut observe: F,
) -> Result<Vec<u8>, E>
where
    O: PaddingOracle + ?Sized,
    E: From<Error>,
    F: FnMut(AttackEvent<'_>) -> Result<(), E>,
{
    let block_len = target.len();
    if block_len == 0 || block_len > u8::MAX as usize || prev.len() != block_len {
        return Err(Error::BlockLength.into());
    }

    let mut intermediate = vec![0_u8; block_len];

    // crafted previous block || target block
    let mut candidate = Vec::with_capacity(2 * block_len);
    candidate.extend_from_slice(prev);
    candidate.extend_from_slice(target);

    for pad_len in 1..=block_len {
        let pos = block_len - pad_len;
        let pad = pad_len as u8;

        observe(AttackEvent::ByteStart {
            position: pos,
            padding: pad,
        })?;

        // force already solved bytes to decrypt to the padding value
        for i in pos + 1..block_len {
            candidate[i] = intermediate[i] ^ pad;
        }

        let mut found = None;
        let mut false_positives = 0;
        let mut queries = 0;

        for guess in 0x00..=0xff_u8 {
            candidate[pos] = guess;
            queries += 1;
            if !oracle.is_valid_padding(&candidate) {
                continue;
            }

            if pad_len == 1 && pos > 0 {
                candidate[pos - 1] ^= 0x01;
                queries += 1;
                let still_valid = oracle.is_valid_padding(&candidate);
                candidate[pos - 1] ^= 0x01;

                // the hit relied on the byte before it, so the padding was longer than one
                if !still_valid {
                    false_positives += 1;
                    continue;
                }
            }

            found = Some(guess);
            break;
        }

        let guess = found.ok_or(Error::OracleExhausted { position: pos })?;
        intermediate[pos] = guess ^ pad;

        observe(AttackEvent::ByteFound(&ByteRecovery {
            position: pos,
            padding: pad,
            guess,
            intermediate: intermediate[pos],
            false_positives,
            queries,
        }))?;
    }

    Ok(intermediate)
}

/// Strip padding from recovered plaintext, trusting its own final byte
///
/// errors: InvalidPadding when the final byte is zero, exceeds the block
/// length or the plaintext
pub fn strip_recovered_padding(plaintext: &[u8], block_len: usize) -> Result<Vec<u8>, Error> {
    let pad_byte = *plaintext.last().ok_or(Error::InvalidPadding(0))?;
    let pad_len = pad_byte as usize;

    if pad_len == 0 || pad_len > block_len || pad_len > plaintext.len() {
        return Err(Error::InvalidPadding(pad_byte));
    }

    Ok(plaintext[..plaintext.len() - pad_len].to_vec())
}

/// Decrypt a whole CBC ciphertext with nothing but the padding oracle
///
/// Blocks are attacked from the last one back to the first, which uses the IV
/// as its previous block. Returns the unpadded plaintext.
pub fn decrypt_with_padding_oracle<O: PaddingOracle + ?Sized>(
    oracle: &O,
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    let block_len = oracle.block_len();
    if block_len == 0 || ciphertext.is_empty() || ciphertext.len() % block_len != 0 {
        return Err(Error::CiphertextLength(ciphertext.len()));
    }
    if iv.len() != block_len {
        return Err(Error::BlockLength);
    }

    let blocks: Vec<&[u8]> = ciphertext.chunks_exact(block_len).collect();
    let mut plaintext = vec![0_u8; ciphertext.len()];

    for idx in (0..blocks.len()).rev() {
        let prev = if idx == 0 { iv } else { blocks[idx - 1] };

        let mut block = recover_intermediate::<_, Error, _>(oracle, prev, blocks[idx], |_| Ok(()))?;
        bytes::xor_assign(&mut block, prev);

        plaintext[idx * block_len..(idx + 1) * block_len].copy_from_slice(&block);
    }

    strip_recovered_padding(&plaintext, block_len)
}
