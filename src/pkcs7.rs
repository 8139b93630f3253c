use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid padding byte {0:#04x}")]
    InvalidPadding(u8),
    #[error("padded data must be a non-empty multiple of the block length")]
    InvalidLength,
}

/// Pad a message to a multiple of `block_len`
///
/// Pad value is the number of padding bytes. A block-aligned message
/// gets a full block of padding.
pub fn pad(msg: &[u8], block_len: usize) -> Vec<u8> {
    let pad_len = block_len - (msg.len() % block_len);
    let mut res = Vec::with_capacity(msg.len() + pad_len);
    res.extend_from_slice(msg);
    res.resize(msg.len() + pad_len, pad_len as u8);
    res
}

/// Check the padding on the final block of `data`
///
/// Returns the padding length
pub fn validate(data: &[u8], block_len: usize) -> Result<usize, Error> {
    let len = data.len();
    if len == 0 || len % block_len != 0 {
        return Err(Error::InvalidLength);
    }

    let pad_byte = data[len - 1];
    let pad_len = pad_byte as usize;
    if pad_len == 0 || pad_len > block_len {
        return Err(Error::InvalidPadding(pad_byte));
    }

    if data[len - pad_len..].iter().any(|&b| b != pad_byte) {
        return Err(Error::InvalidPadding(pad_byte));
    }

    Ok(pad_len)
}

/// Remove valid padding from `data`
pub fn unpad(data: &[u8], block_len: usize) -> Result<Vec<u8>, Error> {
    let pad_len = validate(data, block_len)?;
    Ok(data[..data.len() - pad_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_pad() {
        assert_eq!(pad(b"YELLOW SUBMARINE", 20), b"YELLOW SUBMARINE\x04\x04\x04\x04".to_vec());
        assert_eq!(pad(&[], 16), vec![16_u8; 16]);
        assert_eq!(pad(&[0xaa; 16], 16)[16..], [16_u8; 16]);
        assert_eq!(pad(&[0xaa; 15], 16)[15], 1);
    }

    #[test]
    fn check_validate() {
        assert_eq!(validate(b"ICE ICE BABY\x04\x04\x04\x04", 16), Ok(4));
        assert_eq!(
            validate(b"ICE ICE BABY\x05\x05\x05\x05", 16),
            Err(Error::InvalidPadding(5))
        );
        assert_eq!(
            validate(b"ICE ICE BABY\x01\x02\x03\x04", 16),
            Err(Error::InvalidPadding(4))
        );
        assert_eq!(
            validate(b"ICE ICE BABY\x00\x00\x00\x00", 16),
            Err(Error::InvalidPadding(0))
        );
        assert_eq!(validate(&[17_u8; 16], 16), Err(Error::InvalidPadding(17)));
        assert_eq!(validate(&[], 16), Err(Error::InvalidLength));
        assert_eq!(validate(&[1_u8; 15], 16), Err(Error::InvalidLength));
    }

    #[test]
    fn check_unpad() {
        assert_eq!(unpad(&pad(b"", 16), 16).unwrap(), b"".to_vec());
        assert_eq!(unpad(&pad(b"attack at dawn", 16), 16).unwrap(), b"attack at dawn".to_vec());
    }
}
