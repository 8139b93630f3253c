use serde::Serializer;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid Base64 length")]
    Base64Length,
    #[error("invalid hex length")]
    HexLength,
    #[error("invalid Base64 encoding")]
    InvalidBase64,
    #[error("invalid hex digit")]
    ParseInt,
}

const HEX_ALPHABET: &[u8; 16] = b"0123456789abcdef";

/// Hex-encode a byte slice (lowercase)
pub fn to_hex(bytes: &[u8]) -> String {
    let mut res = String::with_capacity(bytes.len() * 2);
    for &b in bytes.iter() {
        res.push(HEX_ALPHABET[(b >> 4) as usize] as char);
        res.push(HEX_ALPHABET[(b & 0x0f) as usize] as char);
    }
    res
}

/// Hex-decode a string
///
/// errors: returns Error on odd length and empty hex strings
pub fn from_hex(hex: &str) -> Result<Vec<u8>, Error> {
    let hex_len = hex.len();
    if hex_len % 2 != 0 || hex_len == 0 {
        return Err(Error::HexLength);
    }

    let mut res = Vec::with_capacity(hex_len / 2);
    for i in 0..(hex_len / 2) {
        let digits = hex.get(i * 2..=i * 2 + 1).ok_or(Error::ParseInt)?;
        res.push(u8::from_str_radix(digits, 16).map_err(|_| Error::ParseInt)?);
    }
    Ok(res)
}

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Base64 encode a byte slice
///
/// An empty slice encodes to an empty string
pub fn to_base64(bytes: &[u8]) -> String {
    let bytes_len = bytes.len();
    if bytes_len == 0 {
        return String::new();
    }

    let padding_len = match bytes_len % 3 {
        1 => 2,
        2 => 1,
        _ => 0,
    };

    let b64_len = base64_len(bytes_len);
    let mut b64 = Vec::with_capacity(b64_len);

    // Process three input bytes as group of six bit indexes into alphabet
    for group in bytes.chunks(3) {
        let byte_1 = group[0];
        let byte_2 = group.get(1).copied().unwrap_or(0);
        let byte_3 = group.get(2).copied().unwrap_or(0);

        // first six bits of first byte
        b64.push(BASE64_ALPHABET[((byte_1 & 0xfc) >> 2) as usize]);
        // last two bits of first byte, first four bits of second byte
        b64.push(BASE64_ALPHABET[(((byte_1 & 0x03) << 4) | ((byte_2 & 0xf0) >> 4)) as usize]);
        // last four bits of second byte, first two bits of third byte
        b64.push(BASE64_ALPHABET[((byte_2 & 0x0f) << 2 | ((byte_3 & 0xc0) >> 6)) as usize]);
        // last six bits of third byte
        b64.push(BASE64_ALPHABET[(byte_3 & 0x3f) as usize]);
    }

    // process any padding bytes
    for b in &mut b64[b64_len - padding_len..] {
        *b = b'=';
    }

    // every byte comes from the ASCII alphabet
    b64.into_iter().map(|b| b as char).collect()
}

/// Decode Base64-encoded byte slice
///
/// Returns Error for invalid Base64 length, or invalid encoding
pub fn from_base64(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let bytes_len = bytes.len();

    if bytes_len % 4 != 0 || bytes_len == 0 {
        return Err(Error::Base64Length);
    }

    for (i, &byte) in bytes.iter().enumerate() {
        if byte == b'=' {
            if i != bytes_len - 2 && i != bytes_len - 1 {
                return Err(Error::InvalidBase64);
            }
        } else if !BASE64_ALPHABET.contains(&byte) {
            return Err(Error::InvalidBase64);
        }
    }

    let mut res: Vec<u8> = Vec::with_capacity(bytes_len / 4 * 3);
    for group in bytes.chunks_exact(4) {
        // lookup indices in the base64 alphabet to get the next 24 bits of encoded data
        let enc_bytes: u32 = ((from_base64_byte(group[0]) as u32) << 18)
            | ((from_base64_byte(group[1]) as u32) << 12)
            | ((from_base64_byte(group[2]) as u32) << 6)
            | (from_base64_byte(group[3]) as u32);

        res.push(((enc_bytes & 0x00ff_0000) >> 16) as u8);
        res.push(((enc_bytes & 0x0000_ff00) >> 8) as u8);
        res.push((enc_bytes & 0x0000_00ff) as u8);
    }

    let pad_len = bytes[bytes_len - 2..].iter().filter(|&&b| b == b'=').count();
    res.truncate(res.len() - pad_len);

    Ok(res)
}

/// Get the index of the encoded byte in the Base64 alphabet
///
/// Padding and non-alphabet bytes map to zero
fn from_base64_byte(byte: u8) -> u8 {
    BASE64_ALPHABET
        .iter()
        .position(|&b| b == byte)
        .map(|i| i as u8)
        .unwrap_or(0)
}

fn base64_len(len: usize) -> usize {
    (len + 2) / 3 * 4
}

/// Serialize a byte string as Base64
pub fn serialize_base64<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&to_base64(bytes))
}

/// Serialize an optional byte string as Base64
pub fn serialize_base64_opt<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => s.serialize_some(&to_base64(b)),
        None => s.serialize_none(),
    }
}

/// Serialize a byte string as lowercase hex
pub fn serialize_hex<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&to_hex(bytes))
}
