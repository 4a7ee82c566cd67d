//! Uniform block devices over the console's storage media.
//!
//! Every medium is exposed through [`BlockDevice`]: whole 512-byte sectors,
//! an explicit init/close lifecycle and a hardware presence probe.
//!
//! | Module | Device name | Medium |
//! |--------|-------------|--------|
//! | [`sdmmc`] | `sd`, `rnand` | SD card slot and raw NAND on the shared SD/MMC transport |
//! | [`nand_crypt`] | `dnand` | NAND with transparent counter-mode crypto |
//! | [`spiflash`] | `nvram` | read-only SPI flash |
//!
//! The three SD/MMC identities share one transport and only one of them is
//! usable at a time; see [`sdmmc::Sdmmc`] for the rules.

pub mod nand_crypt;
pub mod sdmmc;
pub mod spiflash;

use std::fmt;

use crate::{Error, Result};

/// Size of one sector in bytes.
pub const SECTOR_SIZE: usize = 512;

/// `log2(SECTOR_SIZE)`.
pub const SECTOR_SHIFT: u32 = 9;

/// Capability set shared by every storage backend.
pub trait BlockDevice {
    /// Short device name (`"sd"`, `"rnand"`, `"dnand"`, `"nvram"`).
    fn name(&self) -> &'static str;

    /// Whether [`init`](Self::init) has succeeded since the last close or
    /// transport reset.
    fn is_initialized(&self) -> bool;

    /// Bring the medium up. Calling it on an initialized device is a no-op.
    fn init(&mut self) -> Result<()>;

    /// Read `count` sectors starting at `sector` into `buf`.
    fn read_sectors(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()>;

    /// Write `count` sectors starting at `sector` from `buf`.
    fn write_sectors(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<()>;

    /// Mark the device uninitialized. Never fails.
    fn close(&mut self);

    /// Whether the medium is physically present.
    fn is_active(&mut self) -> bool;

    /// Total sectors of the medium. Only defined once initialized.
    fn sector_count(&self) -> Result<u32>;
}

/// Closed set of devices a [`crate::Storage`] context provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceTag {
    Sd,
    RawNand,
    DecryptedNand,
    SpiFlash,
}

impl DeviceTag {
    pub const ALL: [DeviceTag; 4] = [
        DeviceTag::Sd,
        DeviceTag::RawNand,
        DeviceTag::DecryptedNand,
        DeviceTag::SpiFlash,
    ];

    /// Map a filesystem device number to a tag.
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceTag::Sd => "sd",
            DeviceTag::RawNand => "rnand",
            DeviceTag::DecryptedNand => "dnand",
            DeviceTag::SpiFlash => "nvram",
        }
    }
}

impl fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validate a sector request against its buffer and return the byte length.
///
/// Empty requests and buffers shorter than `count` sectors are rejected.
pub(crate) fn transfer_len(count: u32, buf_len: usize) -> Result<usize> {
    if count == 0 {
        return Err(Error::InvalidRange);
    }
    let len = (count as usize)
        .checked_mul(SECTOR_SIZE)
        .ok_or(Error::InvalidRange)?;
    if buf_len < len {
        return Err(Error::InvalidRange);
    }
    Ok(len)
}
