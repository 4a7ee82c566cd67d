//! Storage configuration: console identity, provisioned keys and tunables.
//!
//! On hardware the identity words are read from fixed memory regions filled
//! in by the boot ROM and the hardware revision comes from the platform-info
//! block. Here they are plain data so callers can supply them from wherever
//! they live.
//!
//! ## File format
//! The same `name = value` text format as the key file. Recognised names:
//!
//! | Name | Value |
//! |------|-------|
//! | `nand_cid`        | 32 hex digits (16 bytes) |
//! | `twl_console_id`  | 16 hex digits, two big-endian words |
//! | `twl_key_y`       | 24 hex digits, three big-endian words |
//! | `new_hardware`    | `0` or `1` |
//! | `sd_detect_timeout_ms` | decimal |
//! | `write_scratch_size`   | decimal, a multiple of 512 |
//! | `slot0xNNKey{X,Y,N}`   | see [`crate::keys`] |

use std::io::{BufRead, BufReader, Read};

use log::warn;

use crate::device::SECTOR_SIZE;
use crate::keys::KeyStore;
use crate::utils::hex_array;
use crate::{Error, Result};

/// Default wait before re-checking the SD card-detect signal.
pub const DEFAULT_SD_DETECT_TIMEOUT_MS: u32 = 300;

/// Default size of the re-encryption scratch buffer (8 sectors).
pub const DEFAULT_WRITE_SCRATCH_SIZE: usize = 0x1000;

/// Device-unique identity data the NAND crypto is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleIdentity {
    /// NAND chip CID; hashed to obtain both counter seeds.
    pub nand_cid: [u8; 16],
    /// The two console-id words mixed into the TWL key X.
    pub twl_console_id: [u32; 2],
    /// The three words copied into the TWL key Y.
    pub twl_key_y: [u32; 3],
    /// Hardware revision flag; selects the CTR-NAND keyslot.
    pub new_hardware: bool,
}

/// Everything needed to build a [`crate::Storage`] context.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub identity: ConsoleIdentity,
    pub keys: KeyStore,
    pub sd_detect_timeout_ms: u32,
    pub write_scratch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            identity: ConsoleIdentity::default(),
            keys: KeyStore::new(),
            sd_detect_timeout_ms: DEFAULT_SD_DETECT_TIMEOUT_MS,
            write_scratch_size: DEFAULT_WRITE_SCRATCH_SIZE,
        }
    }
}

impl StorageConfig {
    /// Create a configuration with default tunables and empty identity.
    pub fn new(identity: ConsoleIdentity, keys: KeyStore) -> Self {
        Self {
            identity,
            keys,
            ..Self::default()
        }
    }

    /// Load a configuration from a reader.
    ///
    /// Unknown names are skipped so that the format stays forward-compatible;
    /// malformed values are reported as [`Error::Parse`].
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let mut cfg = Self::default();
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
            let (name, value) = (name.trim(), value.trim());
            if cfg.keys.parse_entry(name, value)? {
                continue;
            }
            cfg.parse_entry(name, value)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn parse_entry(&mut self, name: &str, value: &str) -> Result<()> {
        let id = &mut self.identity;
        match name {
            "nand_cid" => {
                id.nand_cid = hex_array::<16>(value).map_err(|_| Error::Parse("nand_cid"))?;
            }
            "twl_console_id" => {
                let b = hex_array::<8>(value).map_err(|_| Error::Parse("twl_console_id"))?;
                id.twl_console_id = be_words(&b);
            }
            "twl_key_y" => {
                let b = hex_array::<12>(value).map_err(|_| Error::Parse("twl_key_y"))?;
                id.twl_key_y = be_words(&b);
            }
            "new_hardware" => {
                id.new_hardware = match value {
                    "0" => false,
                    "1" => true,
                    _ => return Err(Error::Parse("new_hardware")),
                };
            }
            "sd_detect_timeout_ms" => {
                self.sd_detect_timeout_ms = value
                    .parse()
                    .map_err(|_| Error::Parse("sd_detect_timeout_ms"))?;
            }
            "write_scratch_size" => {
                self.write_scratch_size = value
                    .parse()
                    .map_err(|_| Error::Parse("write_scratch_size"))?;
            }
            _ => warn!("config: unknown entry {name}"),
        }
        Ok(())
    }

    /// Reject tunables the write path cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.write_scratch_size == 0 || self.write_scratch_size % SECTOR_SIZE != 0 {
            return Err(Error::Parse("write_scratch_size must be a non-zero sector multiple"));
        }
        Ok(())
    }
}

fn be_words<const N: usize, const W: usize>(b: &[u8; N]) -> [u32; W] {
    core::array::from_fn(|i| {
        u32::from_be_bytes([b[i * 4], b[i * 4 + 1], b[i * 4 + 2], b[i * 4 + 3]])
    })
}
