//! Provisioned keyslot material.
//!
//! On hardware the boot ROM fills most keyslots before the bootloader runs;
//! the storage core only ever selects them by index. To run the core anywhere
//! else, the same material is supplied up front through a [`KeyStore`] and
//! written into the [`AesEngine`] when the storage context is built.
//!
//! This module intentionally avoids cryptographic operations - it is a plain
//! data container plus a loader.
//!
//! ## Key file format
//! Simple `name = hex_value` text, one entry per line, comments prefixed with
//! `;`. Names have the form `slot0xNNKeyX`, `slot0xNNKeyY` or `slot0xNNKeyN`
//! (normal key); values are 32 hex digits in the unit's internal big-endian
//! representation.

use std::io::{BufRead, BufReader, Read};

use log::{debug, warn};

use crate::crypto::engine::{AesEngine, KEYSLOT_COUNT, KeyType};
use crate::utils::hex_array;
use crate::{Error, Result};

/// Key material for one keyslot. Absent registers are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotKeys {
    pub normal: Option<[u8; 16]>,
    pub x: Option<[u8; 16]>,
    pub y: Option<[u8; 16]>,
}

/// Keys for all keyslots of the AES unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStore {
    slots: [SlotKeys; KEYSLOT_COUNT],
}

impl Default for KeyStore {
    fn default() -> Self {
        Self {
            slots: [SlotKeys::default(); KEYSLOT_COUNT],
        }
    }
}

impl KeyStore {
    /// Create an empty key store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one register of a keyslot.
    pub fn set(&mut self, keyslot: u8, kind: KeyType, key: [u8; 16]) -> Result<()> {
        let slot = self
            .slots
            .get_mut(keyslot as usize)
            .ok_or(Error::InvalidKeyslot(keyslot))?;
        match kind {
            KeyType::Normal => slot.normal = Some(key),
            KeyType::X => slot.x = Some(key),
            KeyType::Y => slot.y = Some(key),
        }
        Ok(())
    }

    /// Key material of one keyslot.
    pub fn get(&self, keyslot: u8) -> Option<&SlotKeys> {
        self.slots.get(keyslot as usize)
    }

    /// Parse a single `name = value` entry.
    ///
    /// Returns `Ok(false)` when the name is not a keyslot entry so callers can
    /// try other interpretations.
    pub(crate) fn parse_entry(&mut self, name: &str, value: &str) -> Result<bool> {
        let Some(rest) = name.strip_prefix("slot0x") else {
            return Ok(false);
        };
        let Some((slot_str, kind_str)) = rest.split_at_checked(2) else {
            return Ok(false);
        };
        let kind = match kind_str {
            "KeyX" => KeyType::X,
            "KeyY" => KeyType::Y,
            "KeyN" => KeyType::Normal,
            _ => return Ok(false),
        };
        let Ok(slot) = u8::from_str_radix(slot_str, 16) else {
            return Ok(false);
        };
        let key = hex_array::<16>(value).map_err(|_| Error::Parse("malformed key value"))?;
        self.set(slot, kind, key)?;
        Ok(true)
    }

    /// Load keys from a key-file reader.
    ///
    /// Lines beginning with `;` and blank lines are ignored. Unknown names are
    /// skipped; malformed values for known names are skipped with a warning.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<()> {
        let buf = BufReader::new(reader);
        for line in buf.lines() {
            let line = line.map_err(Error::Stream)?;
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            if let Err(e) = self.parse_entry(name.trim(), value.trim()) {
                warn!("key file: skipping {}: {e}", name.trim());
            }
        }
        Ok(())
    }

    /// Write every provisioned register into the AES unit.
    ///
    /// Key X is written before key Y so a slot with both gets its normal key
    /// generated; an explicit normal key is written last and wins.
    pub fn apply(&self, engine: &mut AesEngine) -> Result<()> {
        for (slot, keys) in self.slots.iter().enumerate() {
            let slot = slot as u8;
            if let Some(x) = keys.x {
                engine.set_key_raw(slot, KeyType::X, x, false)?;
            }
            if let Some(y) = keys.y {
                engine.set_key_raw(slot, KeyType::Y, y, keys.x.is_some())?;
            }
            if let Some(n) = keys.normal {
                engine.set_key_raw(slot, KeyType::Normal, n, false)?;
            }
            if *keys != SlotKeys::default() {
                debug!("keyslot 0x{slot:02X} provisioned");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_slot_entries_and_skips_noise() {
        let text = "\
; boot rom keys
slot0x04KeyN = 000102030405060708090A0B0C0D0E0F
slot0x05KeyX = ffffffffffffffffffffffffffffffff
slot0x05KeyY = 00000000000000000000000000000001
slot0x06KeyN = nothex
header_key = 00
garbage line
";
        let mut ks = KeyStore::new();
        ks.load(text.as_bytes()).unwrap();
        assert_eq!(
            ks.get(0x04).unwrap().normal,
            Some(core::array::from_fn(|i| i as u8))
        );
        assert!(ks.get(0x05).unwrap().x.is_some());
        assert!(ks.get(0x05).unwrap().y.is_some());
        assert_eq!(ks.get(0x06).unwrap(), &SlotKeys::default());
    }

    #[test]
    fn apply_generates_scrambled_keys() {
        let mut ks = KeyStore::new();
        ks.set(0x05, KeyType::X, [1; 16]).unwrap();
        ks.set(0x05, KeyType::Y, [2; 16]).unwrap();
        ks.set(0x07, KeyType::Normal, [3; 16]).unwrap();
        let mut engine = AesEngine::new();
        ks.apply(&mut engine).unwrap();
        assert!(engine.has_key(0x05));
        assert!(engine.has_key(0x07));
        assert!(!engine.has_key(0x04));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut ks = KeyStore::new();
        assert!(ks.set(0x40, KeyType::Normal, [0; 16]).is_err());
        assert!(ks.parse_entry("slot0x41KeyN", "00000000000000000000000000000000").is_err());
    }
}
