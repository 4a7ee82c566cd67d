//! AES-128 block cipher and the keyslot key scramblers.
//!
//! Only the forward (encryption) direction is implemented: counter mode
//! never needs the inverse cipher, decryption is the same keystream XOR.
//!
//! The block cipher uses a compact lookup-table approach. It is not
//! constant-time; it models a hardware unit for testing and tooling, and the
//! key material it handles is already present in the device's boot ROM.

/// One 16-byte AES block, stored in column-major order as in FIPS-197.
pub type Block = [u8; 16];

// Rijndael S-box: multiplicative inverse in GF(2^8) followed by the affine map.
// https://en.wikipedia.org/wiki/Rijndael_S-box
const SBOX: [u8; 256] = [
    0x63, 0x7C, 0x77, 0x7B, 0xF2, 0x6B, 0x6F, 0xC5, 0x30, 0x01, 0x67, 0x2B, 0xFE, 0xD7, 0xAB, 0x76,
    0xCA, 0x82, 0xC9, 0x7D, 0xFA, 0x59, 0x47, 0xF0, 0xAD, 0xD4, 0xA2, 0xAF, 0x9C, 0xA4, 0x72, 0xC0,
    0xB7, 0xFD, 0x93, 0x26, 0x36, 0x3F, 0xF7, 0xCC, 0x34, 0xA5, 0xE5, 0xF1, 0x71, 0xD8, 0x31, 0x15,
    0x04, 0xC7, 0x23, 0xC3, 0x18, 0x96, 0x05, 0x9A, 0x07, 0x12, 0x80, 0xE2, 0xEB, 0x27, 0xB2, 0x75,
    0x09, 0x83, 0x2C, 0x1A, 0x1B, 0x6E, 0x5A, 0xA0, 0x52, 0x3B, 0xD6, 0xB3, 0x29, 0xE3, 0x2F, 0x84,
    0x53, 0xD1, 0x00, 0xED, 0x20, 0xFC, 0xB1, 0x5B, 0x6A, 0xCB, 0xBE, 0x39, 0x4A, 0x4C, 0x58, 0xCF,
    0xD0, 0xEF, 0xAA, 0xFB, 0x43, 0x4D, 0x33, 0x85, 0x45, 0xF9, 0x02, 0x7F, 0x50, 0x3C, 0x9F, 0xA8,
    0x51, 0xA3, 0x40, 0x8F, 0x92, 0x9D, 0x38, 0xF5, 0xBC, 0xB6, 0xDA, 0x21, 0x10, 0xFF, 0xF3, 0xD2,
    0xCD, 0x0C, 0x13, 0xEC, 0x5F, 0x97, 0x44, 0x17, 0xC4, 0xA7, 0x7E, 0x3D, 0x64, 0x5D, 0x19, 0x73,
    0x60, 0x81, 0x4F, 0xDC, 0x22, 0x2A, 0x90, 0x88, 0x46, 0xEE, 0xB8, 0x14, 0xDE, 0x5E, 0x0B, 0xDB,
    0xE0, 0x32, 0x3A, 0x0A, 0x49, 0x06, 0x24, 0x5C, 0xC2, 0xD3, 0xAC, 0x62, 0x91, 0x95, 0xE4, 0x79,
    0xE7, 0xC8, 0x37, 0x6D, 0x8D, 0xD5, 0x4E, 0xA9, 0x6C, 0x56, 0xF4, 0xEA, 0x65, 0x7A, 0xAE, 0x08,
    0xBA, 0x78, 0x25, 0x2E, 0x1C, 0xA6, 0xB4, 0xC6, 0xE8, 0xDD, 0x74, 0x1F, 0x4B, 0xBD, 0x8B, 0x8A,
    0x70, 0x3E, 0xB5, 0x66, 0x48, 0x03, 0xF6, 0x0E, 0x61, 0x35, 0x57, 0xB9, 0x86, 0xC1, 0x1D, 0x9E,
    0xE1, 0xF8, 0x98, 0x11, 0x69, 0xD9, 0x8E, 0x94, 0x9B, 0x1E, 0x87, 0xE9, 0xCE, 0x55, 0x28, 0xDF,
    0x8C, 0xA1, 0x89, 0x0D, 0xBF, 0xE6, 0x42, 0x68, 0x41, 0x99, 0x2D, 0x0F, 0xB0, 0x54, 0xBB, 0x16,
];

// Round constants for the key schedule: x^(i-1) in GF(2^8).
const RCON: [u8; 10] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1B, 0x36];

/// Additive constant of the 3DS-native key scrambler (slots 0x04 and up).
pub const CTR_SCRAMBLER_C: u128 = 0x1FF9_E9AA_C5FE_0408_0245_91DC_5D52_768A;

/// Additive constant of the DSi-compatible key scrambler (slots 0x00-0x03).
pub const TWL_SCRAMBLER_C: u128 = 0xFFFE_FB4E_2959_0258_2A68_0F5F_1A4F_3E79;

// Multiply by x in GF(2^8) mod x^8+x^4+x^3+x+1.
#[inline]
fn xtime(a: u8) -> u8 {
    (a << 1) ^ if a & 0x80 != 0 { 0x1B } else { 0 }
}

fn sub_bytes(s: &mut Block) {
    for b in s.iter_mut() {
        *b = SBOX[*b as usize];
    }
}

// Row r (bytes r, r+4, r+8, r+12 in column-major order) rotates left by r.
fn shift_rows(s: &mut Block) {
    let t = *s;
    for col in 0..4 {
        for row in 1..4 {
            s[col * 4 + row] = t[((col + row) % 4) * 4 + row];
        }
    }
}

// Multiply each column by the MDS matrix with rows [2 3 1 1] (cyclic).
fn mix_columns(s: &mut Block) {
    for col in s.chunks_exact_mut(4) {
        let (a0, a1, a2, a3) = (col[0], col[1], col[2], col[3]);
        let all = a0 ^ a1 ^ a2 ^ a3;
        col[0] ^= all ^ xtime(a0 ^ a1);
        col[1] ^= all ^ xtime(a1 ^ a2);
        col[2] ^= all ^ xtime(a2 ^ a3);
        col[3] ^= all ^ xtime(a3 ^ a0);
    }
}

fn add_round_key(s: &mut Block, rk: &[u8]) {
    for (b, k) in s.iter_mut().zip(rk) {
        *b ^= k;
    }
}

/// An expanded AES-128 key.
#[derive(Clone)]
pub struct Aes128 {
    round_keys: [u8; 176],
}

impl Aes128 {
    /// Run the key schedule for a 16-byte key.
    pub fn new(key: &[u8; 16]) -> Self {
        let mut w = [0u8; 176];
        w[..16].copy_from_slice(key);
        for i in 4..44usize {
            let mut t = [
                w[(i - 1) * 4],
                w[(i - 1) * 4 + 1],
                w[(i - 1) * 4 + 2],
                w[(i - 1) * 4 + 3],
            ];
            if i % 4 == 0 {
                t = [
                    SBOX[t[1] as usize] ^ RCON[i / 4 - 1],
                    SBOX[t[2] as usize],
                    SBOX[t[3] as usize],
                    SBOX[t[0] as usize],
                ];
            }
            for j in 0..4 {
                w[i * 4 + j] = w[(i - 4) * 4 + j] ^ t[j];
            }
        }
        Self { round_keys: w }
    }

    /// Encrypt one block (10 rounds, the last one without MixColumns).
    pub fn encrypt_block(&self, block: &Block) -> Block {
        let rk = &self.round_keys;
        let mut s = *block;
        add_round_key(&mut s, &rk[..16]);
        for round in 1..10 {
            sub_bytes(&mut s);
            shift_rows(&mut s);
            mix_columns(&mut s);
            add_round_key(&mut s, &rk[round * 16..(round + 1) * 16]);
        }
        sub_bytes(&mut s);
        shift_rows(&mut s);
        add_round_key(&mut s, &rk[160..]);
        s
    }
}

impl std::fmt::Debug for Aes128 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Aes128 { .. }")
    }
}

/// Derive a normal key from key X / key Y the way the keyslot hardware does.
///
/// Both inputs and the result are 128-bit values in the unit's internal
/// big-endian representation. Slots below 0x04 use the DSi-compatible
/// scrambler, all others the 3DS-native one.
pub fn scramble(keyslot: u8, key_x: &Block, key_y: &Block) -> Block {
    let x = u128::from_be_bytes(*key_x);
    let y = u128::from_be_bytes(*key_y);
    let normal = if keyslot < 0x04 {
        (x ^ y).wrapping_add(TWL_SCRAMBLER_C).rotate_left(42)
    } else {
        (x.rotate_left(2) ^ y).wrapping_add(CTR_SCRAMBLER_C).rotate_left(87)
    };
    normal.to_be_bytes()
}
