//! NCSD - the volume header in sector 0 of the console NAND.
//!
//! ## Layout (one 0x200-byte sector)
//! ```text
//! [0x000] RSA-2048 signature over [0x100..0x200]   (0x100 bytes)
//! [0x100] Magic "NCSD"                              (4 bytes, 0x4453434E LE)
//! [0x104] ImageSize in media units                  (u32 LE)
//! [0x108] MediaId                                   (u64 LE, zero for NAND)
//! [0x110] PartitionFsType[8]                        (1 byte each)
//! [0x118] PartitionCryptType[8]                     (1 byte each)
//! [0x120] PartitionTable[8] { offset, size }        (u32 LE each, media units)
//! [0x160] ExtendedHeaderHash / AdditionalHeaderSize / SectorZeroOffset / ...
//! ```
//!
//! A media unit is one 0x200-byte sector. Unused slots carry fs type 0 and a
//! zero size.
//!
//! ## Partition fs types
//! | Value | Meaning |
//! |-------|---------|
//! | 0 | unused |
//! | 1 | normal (TWL NAND at slot 0, CTR NAND at slot 4) |
//! | 3 | FIRM |
//! | 4 | AGB_FIRM save |

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::Result;
use crate::utils::{bytesa, le_u32, le_u64, magic};

/// Number of partition slots in the header.
pub const MAX_PARTITIONS: usize = 8;

/// Magic value as compared by the boot code (little-endian `u32`).
pub const NCSD_MAGIC: u32 = 0x4453_434E;

/// Byte offset of the magic inside sector 0.
pub const MAGIC_OFFSET: u64 = 0x100;

/// Filesystem type of a partition slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    Unused,
    Normal,
    Firm,
    AgbSave,
    Unknown(u8),
}

impl From<u8> for FsType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Unused,
            1 => Self::Normal,
            3 => Self::Firm,
            4 => Self::AgbSave,
            x => Self::Unknown(x),
        }
    }
}

/// One `{offset, size}` slot of the partition table, in sectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NcsdPartition {
    pub offset: u32,
    pub size: u32,
}

/// Parsed NCSD header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ncsd {
    /// Whole image size in sectors.
    pub image_size: u32,
    pub media_id: u64,
    /// Raw fs type byte per slot.
    pub fs_types: [u8; MAX_PARTITIONS],
    /// Raw crypt type byte per slot.
    pub crypt_types: [u8; MAX_PARTITIONS],
    pub partitions: [NcsdPartition; MAX_PARTITIONS],
}

impl Ncsd {
    /// Parse the header from a reader positioned at the start of sector 0.
    ///
    /// The signature is skipped, not verified.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        r.seek(SeekFrom::Start(base + MAGIC_OFFSET))?;
        magic(r, b"NCSD")?;

        let image_size = le_u32(r)?;
        let media_id = le_u64(r)?;
        let fs_types = bytesa::<MAX_PARTITIONS>(r)?;
        let crypt_types = bytesa::<MAX_PARTITIONS>(r)?;

        let mut partitions = [NcsdPartition::default(); MAX_PARTITIONS];
        for p in &mut partitions {
            p.offset = le_u32(r)?;
            p.size = le_u32(r)?;
        }

        Ok(Self {
            image_size,
            media_id,
            fs_types,
            crypt_types,
            partitions,
        })
    }

    /// Parse the header from a raw sector buffer.
    pub fn from_sector(sector: &[u8]) -> Result<Self> {
        Self::parse(&mut Cursor::new(sector))
    }

    /// Typed fs type of slot `i`, `None` past the last slot.
    pub fn fs_type(&self, i: usize) -> Option<FsType> {
        self.fs_types.get(i).copied().map(FsType::from)
    }
}
