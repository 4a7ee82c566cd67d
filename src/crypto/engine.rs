//! Software model of the keyslot AES unit.
//!
//! The unit keeps 0x40 keyslots. Software never reads key material back; it
//! writes key X / key Y (or a normal key) into a slot, selects a slot by
//! index, programs a counter and streams data through. Everything the unit
//! consumes (keys, counters, data) passes through the byte-order and
//! word-order selection described by [`AesParams`].
//!
//! Internally every 16-byte quantity is held big-endian in normal word order.
//! A counter is a 128-bit big-endian integer that advances by one per block.

use bitflags::bitflags;
use log::trace;

use super::aes::{self, Aes128, Block};
use crate::utils::words_to_le_bytes;
use crate::{Error, Result};

/// Number of keyslots in the unit.
pub const KEYSLOT_COUNT: usize = 0x40;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

bitflags! {
    /// Byte-order and word-order selection of the AES unit.
    ///
    /// An absent `*_BIG` flag means little-endian words; an absent `*_NORMAL`
    /// flag means reversed word order. Bit positions follow the control
    /// register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AesParams: u32 {
        const OUTPUT_BIG    = 1 << 22;
        const INPUT_BIG     = 1 << 23;
        const OUTPUT_NORMAL = 1 << 24;
        const INPUT_NORMAL  = 1 << 25;
    }
}

impl AesParams {
    /// Little-endian words, reversed word order, on both sides.
    pub const LITTLE_REVERSED: Self = Self::empty();
    /// Big-endian words, normal word order, on both sides.
    pub const BIG_NORMAL: Self = Self::INPUT_BIG
        .union(Self::OUTPUT_BIG)
        .union(Self::INPUT_NORMAL)
        .union(Self::OUTPUT_NORMAL);

    fn input_big(self) -> bool {
        self.contains(Self::INPUT_BIG)
    }

    fn input_normal(self) -> bool {
        self.contains(Self::INPUT_NORMAL)
    }

    fn output_big(self) -> bool {
        self.contains(Self::OUTPUT_BIG)
    }

    fn output_normal(self) -> bool {
        self.contains(Self::OUTPUT_NORMAL)
    }
}

/// Which register of a keyslot a key is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// The key used directly by the cipher.
    Normal,
    /// Scrambler input X.
    X,
    /// Scrambler input Y.
    Y,
}

/// Convert a 16-byte quantity between memory layout and the unit's internal
/// layout. The transform is its own inverse.
#[inline]
fn reorder(mut block: Block, big: bool, normal: bool) -> Block {
    if !big {
        for w in block.chunks_exact_mut(4) {
            w.reverse();
        }
    }
    if !normal {
        let mut out = [0u8; 16];
        for (i, w) in block.chunks_exact(4).enumerate() {
            out[(3 - i) * 4..(4 - i) * 4].copy_from_slice(w);
        }
        block = out;
    }
    block
}

#[derive(Debug, Clone, Default)]
struct Keyslot {
    normal: Option<Block>,
    x: Option<Block>,
    y: Option<Block>,
}

/// Per-stream state: data ordering plus the running counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesCtx {
    params: AesParams,
    ctr: u128,
}

impl AesCtx {
    /// Create a context whose data input/output ordering is `params`.
    pub fn new(params: AesParams) -> Self {
        Self { params, ctr: 0 }
    }

    /// Current counter in the unit's internal representation.
    pub fn counter(&self) -> u128 {
        self.ctr
    }
}

/// The keyslot AES unit.
#[derive(Debug)]
pub struct AesEngine {
    slots: Vec<Keyslot>,
    selected: Option<u8>,
}

impl Default for AesEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AesEngine {
    /// Create a unit with every keyslot empty and none selected.
    pub fn new() -> Self {
        Self {
            slots: vec![Keyslot::default(); KEYSLOT_COUNT],
            selected: None,
        }
    }

    fn slot_mut(&mut self, keyslot: u8) -> Result<&mut Keyslot> {
        self.slots
            .get_mut(keyslot as usize)
            .ok_or(Error::InvalidKeyslot(keyslot))
    }

    /// Write key words into a keyslot register.
    ///
    /// Only the input ordering flags of `params` apply. Writing key Y with
    /// `generate` set runs the key scrambler and replaces the slot's normal
    /// key; it fails with [`Error::MissingKey`] if key X was never written.
    pub fn set_key(
        &mut self,
        params: AesParams,
        keyslot: u8,
        kind: KeyType,
        key: &[u32; 4],
        generate: bool,
    ) -> Result<()> {
        let internal = reorder(
            words_to_le_bytes(key),
            params.input_big(),
            params.input_normal(),
        );
        self.set_key_raw(keyslot, kind, internal, generate)
    }

    /// Write a key that is already in the internal representation.
    pub fn set_key_raw(
        &mut self,
        keyslot: u8,
        kind: KeyType,
        key: Block,
        generate: bool,
    ) -> Result<()> {
        let slot = self.slot_mut(keyslot)?;
        match kind {
            KeyType::Normal => slot.normal = Some(key),
            KeyType::X => slot.x = Some(key),
            KeyType::Y => {
                slot.y = Some(key);
                if generate {
                    let x = slot.x.ok_or(Error::MissingKey(keyslot))?;
                    slot.normal = Some(aes::scramble(keyslot, &x, &key));
                    trace!("keyslot 0x{keyslot:02X}: normal key generated");
                }
            }
        }
        Ok(())
    }

    /// Contents of one keyslot register, in the internal representation.
    pub fn key(&self, keyslot: u8, kind: KeyType) -> Option<Block> {
        let slot = self.slots.get(keyslot as usize)?;
        match kind {
            KeyType::Normal => slot.normal,
            KeyType::X => slot.x,
            KeyType::Y => slot.y,
        }
    }

    /// Whether a keyslot holds a usable normal key.
    pub fn has_key(&self, keyslot: u8) -> bool {
        self.slots
            .get(keyslot as usize)
            .is_some_and(|s| s.normal.is_some())
    }

    /// Select the keyslot used by subsequent [`crypt`](Self::crypt) calls.
    pub fn select_keyslot(&mut self, keyslot: u8) -> Result<()> {
        if keyslot as usize >= KEYSLOT_COUNT {
            return Err(Error::InvalidKeyslot(keyslot));
        }
        self.selected = Some(keyslot);
        Ok(())
    }

    /// Currently selected keyslot.
    pub fn selected_keyslot(&self) -> Option<u8> {
        self.selected
    }

    /// Program the counter of `ctx`.
    ///
    /// `words` is the 128-bit seed as stored in memory, interpreted through
    /// the input flags of `params`; `byte_offset` (a multiple of the block
    /// size) is added in blocks.
    pub fn set_ctr_iv_nonce(
        &self,
        ctx: &mut AesCtx,
        words: &[u32; 4],
        params: AesParams,
        byte_offset: u64,
    ) {
        let internal = reorder(
            words_to_le_bytes(words),
            params.input_big(),
            params.input_normal(),
        );
        ctx.ctr = u128::from_be_bytes(internal)
            .wrapping_add((byte_offset / AES_BLOCK_SIZE as u64) as u128);
    }

    fn cipher(&self) -> Result<Aes128> {
        let keyslot = self.selected.ok_or(Error::MissingKey(0xFF))?;
        let key = self.slots[keyslot as usize]
            .normal
            .ok_or(Error::MissingKey(keyslot))?;
        Ok(Aes128::new(&key))
    }

    /// Counter-mode transform of `input` into `output` with the selected key.
    ///
    /// Both slices must have the same length, a multiple of 16. The counter
    /// of `ctx` advances by one per block processed.
    pub fn crypt(&self, ctx: &mut AesCtx, input: &[u8], output: &mut [u8]) -> Result<()> {
        if input.len() != output.len() || input.len() % AES_BLOCK_SIZE != 0 {
            return Err(Error::InvalidRange);
        }
        let cipher = self.cipher()?;
        let p = ctx.params;
        for (src, dst) in input
            .chunks_exact(AES_BLOCK_SIZE)
            .zip(output.chunks_exact_mut(AES_BLOCK_SIZE))
        {
            let keystream = cipher.encrypt_block(&ctx.ctr.to_be_bytes());
            ctx.ctr = ctx.ctr.wrapping_add(1);

            let mut block = reorder(
                src.try_into().map_err(|_| Error::InvalidRange)?,
                p.input_big(),
                p.input_normal(),
            );
            for (b, k) in block.iter_mut().zip(keystream) {
                *b ^= k;
            }
            dst.copy_from_slice(&reorder(block, p.output_big(), p.output_normal()));
        }
        Ok(())
    }

    /// In-place variant of [`crypt`](Self::crypt).
    pub fn crypt_in_place(&self, ctx: &mut AesCtx, buf: &mut [u8]) -> Result<()> {
        if buf.len() % AES_BLOCK_SIZE != 0 {
            return Err(Error::InvalidRange);
        }
        let cipher = self.cipher()?;
        let p = ctx.params;
        for chunk in buf.chunks_exact_mut(AES_BLOCK_SIZE) {
            let keystream = cipher.encrypt_block(&ctx.ctr.to_be_bytes());
            ctx.ctr = ctx.ctr.wrapping_add(1);

            let mut block: Block = reorder(
                (&*chunk).try_into().map_err(|_| Error::InvalidRange)?,
                p.input_big(),
                p.input_normal(),
            );
            for (b, k) in block.iter_mut().zip(keystream) {
                *b ^= k;
            }
            chunk.copy_from_slice(&reorder(block, p.output_big(), p.output_normal()));
        }
        Ok(())
    }
}
