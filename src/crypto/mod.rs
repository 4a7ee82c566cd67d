//! Cryptographic building blocks of the NAND virtualization layer.
//!
//! The console's NAND is encrypted with AES-128-CTR. Key material lives in a
//! hardware keyslot unit; software selects a slot, programs a counter and
//! streams sectors through. [`engine`] models that unit, [`sha`] models the
//! hash unit used to derive the counter seeds from the NAND CID.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`aes`]    | AES-128 block encryption, keyslot key scramblers |
//! | [`engine`] | Keyslots, byte/word ordering, counter-mode streaming |
//! | [`sha`]    | SHA-1/224/256 with selectable word endianness |
//!
//! ## Key lineage (brief)
//!
//! ```text
//! TWL family (DSi-compatible NAND region, keyslot 0x03)
//!   key X  <- console id words XOR fixed constants, "NINTENDO"
//!   key Y  <- identity region words + fixed trailing word
//!   ctr    <- SHA-1(NAND CID)[0..16], read as little-endian reversed words
//!
//! CTR family (3DS-native partitions, keyslots 0x04-0x07)
//!   key    <- provisioned by the boot ROM, selected by index only
//!   ctr    <- SHA-256(NAND CID)[0..16] with word-swapped output
//! ```

pub mod aes;
pub mod engine;
pub mod sha;
