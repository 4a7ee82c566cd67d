//! Low-level primitives shared by the header parser, the crypto engine and the
//! configuration loader.
//!
//! Reader helpers read exactly the bytes they promise or return an error -
//! there is no partial-read ambiguity.

use std::io::Read;
use std::result::Result as StdResult;

use crate::{Error, Result};

/// Read a little-endian `u32`.
#[inline]
pub(crate) fn le_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Read a little-endian `u64`.
#[inline]
pub(crate) fn le_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Verify that the next `N` bytes in the stream match `expected`.
///
/// Returns [`Error::BadMagic`] on mismatch.
#[inline]
pub(crate) fn magic<R: Read, const N: usize>(r: &mut R, expected: &[u8; N]) -> Result<()> {
    let got = bytesa::<N>(r)?;
    if &got != expected {
        return Err(Error::BadMagic);
    }
    Ok(())
}

/// Lay out four 32-bit words the way a little-endian CPU stores them.
#[inline]
pub(crate) fn words_to_le_bytes(words: &[u32; 4]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (chunk, w) in out.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&w.to_le_bytes());
    }
    out
}

/// Byte-swap every 32-bit word of `buf` in place. Trailing bytes that do not
/// form a whole word are left untouched.
#[inline]
pub(crate) fn swap_words(buf: &mut [u8]) {
    for chunk in buf.chunks_exact_mut(4) {
        chunk.reverse();
    }
}

/// Decode exactly `N` bytes of hex, ignoring surrounding whitespace.
pub(crate) fn hex_array<const N: usize>(s: &str) -> StdResult<[u8; N], hex::FromHexError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(s.trim(), &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_laid_out_little_endian() {
        let b = words_to_le_bytes(&[0x0403_0201, 0x0807_0605, 0x0C0B_0A09, 0x100F_0E0D]);
        assert_eq!(b, core::array::from_fn::<u8, 16, _>(|i| i as u8 + 1));
    }

    #[test]
    fn swap_words_reverses_each_word() {
        let mut b = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        swap_words(&mut b);
        assert_eq!(b, [4, 3, 2, 1, 8, 7, 6, 5, 9]);
    }

    #[test]
    fn hex_rejects_wrong_length_and_digits() {
        assert_eq!(hex_array::<2>(" aBcd\n"), Ok([0xAB, 0xCD]));
        assert!(hex_array::<2>("abc").is_err());
        assert!(hex_array::<2>("abcdef").is_err());
        assert!(hex_array::<2>("zzzz").is_err());
    }
}
