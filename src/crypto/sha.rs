//! SHA unit with selectable input/output byte order.
//!
//! The hash unit can consume its input and emit its digest either as
//! big-endian (the standard digest byte string) or little-endian 32-bit words.
//! Little-endian simply byte-swaps every word on the way in or out.

use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256};

use crate::utils::swap_words;
use crate::{Error, Result};

/// Digest algorithm of the hash unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaMode {
    Sha256,
    Sha224,
    Sha1,
}

impl ShaMode {
    /// Digest length in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            ShaMode::Sha256 => 32,
            ShaMode::Sha224 => 28,
            ShaMode::Sha1 => 20,
        }
    }
}

/// Byte order of 32-bit words crossing the unit boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder {
    Big,
    Little,
}

/// Input and output byte order for one hash operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaParams {
    pub input: WordOrder,
    pub output: WordOrder,
}

impl ShaParams {
    pub const fn new(input: WordOrder, output: WordOrder) -> Self {
        Self { input, output }
    }
}

/// Hash `data` and return the digest zero-padded to 32 bytes.
///
/// Little-endian input requires `data` to be a whole number of words.
pub fn sha(data: &[u8], mode: ShaMode, params: ShaParams) -> Result<[u8; 32]> {
    let swapped;
    let input = match params.input {
        WordOrder::Big => data,
        WordOrder::Little => {
            if data.len() % 4 != 0 {
                return Err(Error::InvalidRange);
            }
            let mut v = data.to_vec();
            swap_words(&mut v);
            swapped = v;
            &swapped
        }
    };

    let mut out = [0u8; 32];
    let len = mode.digest_len();
    match mode {
        ShaMode::Sha256 => out.copy_from_slice(&Sha256::digest(input)),
        ShaMode::Sha224 => out[..len].copy_from_slice(&Sha224::digest(input)),
        ShaMode::Sha1 => out[..len].copy_from_slice(&Sha1::digest(input)),
    }

    if params.output == WordOrder::Little {
        swap_words(&mut out[..len]);
    }
    Ok(out)
}
