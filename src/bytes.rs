/// XOR two byte slices
///
/// Returns the bitwise XOR of the two byte slices
///
/// If lengths are unequal, XOR of the min length
pub fn xor(el: &[u8], ar: &[u8]) -> Vec<u8> {
    el.iter().zip(ar.iter()).map(|(eb, ab)| eb ^ ab).collect()
}

/// XOR assign two byte slices
///
/// Computes bitwise XOR of the two bytes slices
/// Assigns the result into the left byte slice
///
/// If lengths are unequal, XOR of the min length
pub fn xor_assign(el: &mut [u8], ar: &[u8]) {
    for (eb, ab) in el.iter_mut().zip(ar.iter()) {
        *eb ^= ab;
    }
}

/// Split a byte slice into owned blocks of `block_len` bytes
///
/// A trailing partial block is kept as-is
pub fn to_blocks(bytes: &[u8], block_len: usize) -> Vec<Vec<u8>> {
    bytes.chunks(block_len).map(|c| c.to_vec()).collect()
}
