//! Partition table derived from the NAND volume header.
//!
//! Records are created once, in header order, and given a keyslot and a name
//! right after creation. Lookups go by name or by sector range; a range
//! resolves to the partition whose extent fully contains it.

use heapless::{String, Vec};
use log::{debug, info};

use crate::formats::ncsd::{FsType, MAX_PARTITIONS, Ncsd};
use crate::{Error, Result};

/// Maximum partition name length in bytes.
pub const PARTITION_NAME_LEN: usize = 8;

/// Keyslot value marking a partition that never serves crypto I/O.
pub const KEYSLOT_INVALID: u8 = 0xFF;

/// Keyslot of the DSi-compatible NAND region.
pub const KEYSLOT_TWL_NAND: u8 = 0x03;
/// Keyslot of CTR-NAND on legacy hardware.
pub const KEYSLOT_CTR_NAND_OLD: u8 = 0x04;
/// Keyslot of CTR-NAND on the newer hardware revision.
pub const KEYSLOT_CTR_NAND_NEW: u8 = 0x05;
/// Keyslot of the FIRM partitions.
pub const KEYSLOT_FIRM: u8 = 0x06;
/// Keyslot of the AGB_FIRM save partition.
pub const KEYSLOT_AGB_SAVE: u8 = 0x07;

/// Header slot holding the TWL NAND region.
const TWL_NAND_SLOT: usize = 0;
/// Header slot holding CTR-NAND.
const CTR_NAND_SLOT: usize = 4;

/// One contiguous sector range on the NAND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub start_sector: u32,
    pub sector_count: u32,
    /// Raw fs type byte from the header.
    pub fs_type: u8,
    /// Raw crypt type byte from the header.
    pub crypt_type: u8,
    pub keyslot: u8,
    pub name: String<PARTITION_NAME_LEN>,
}

impl Partition {
    /// Whether `[sector, sector + count)` lies inside this partition.
    pub fn contains(&self, sector: u32, count: u32) -> bool {
        let start = u64::from(self.start_sector);
        let end = start + u64::from(self.sector_count);
        let req_start = u64::from(sector);
        let req_end = req_start + u64::from(count);
        req_start >= start && req_end <= end
    }

    /// Whether this partition can serve crypto I/O.
    pub fn has_keyslot(&self) -> bool {
        self.keyslot != KEYSLOT_INVALID
    }
}

/// Bounded, ordered collection of partitions.
#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
    entries: Vec<Partition, MAX_PARTITIONS>,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record with an invalid keyslot and an empty name.
    ///
    /// Returns its index, or [`Error::OutOfMemory`] if the table is full.
    pub fn add(&mut self, start_sector: u32, sector_count: u32, fs_type: u8) -> Result<usize> {
        let index = self.entries.len();
        self.entries
            .push(Partition {
                start_sector,
                sector_count,
                fs_type,
                crypt_type: 0,
                keyslot: KEYSLOT_INVALID,
                name: String::new(),
            })
            .map_err(|_| Error::OutOfMemory)?;
        Ok(index)
    }

    pub fn set_keyslot(&mut self, index: usize, keyslot: u8) -> Result<()> {
        let p = self.entries.get_mut(index).ok_or(Error::NotFound)?;
        p.keyslot = keyslot;
        Ok(())
    }

    /// Set the name of a record. Names longer than
    /// [`PARTITION_NAME_LEN`] are rejected.
    pub fn set_name(&mut self, index: usize, name: &str) -> Result<()> {
        let p = self.entries.get_mut(index).ok_or(Error::NotFound)?;
        let mut s = String::new();
        s.push_str(name).map_err(|_| Error::InvalidRange)?;
        p.name = s;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.entries.get(index)
    }

    /// Index of the partition called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|p| p.name == name)
    }

    pub fn by_name(&self, name: &str) -> Option<&Partition> {
        self.index_of(name).and_then(|i| self.get(i))
    }

    /// Index of the partition containing `[sector, sector + count)`.
    ///
    /// An empty range never matches.
    pub fn find(&self, sector: u32, count: u32) -> Option<usize> {
        if count == 0 {
            return None;
        }
        self.entries.iter().position(|p| p.contains(sector, count))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Build the table from a parsed header and classify every slot.
    ///
    /// `new_hardware` selects the CTR-NAND keyslot. Returns the table and the
    /// start sector of CTR-NAND, if the header has one.
    pub fn from_ncsd(header: &Ncsd, new_hardware: bool) -> Result<(Self, Option<u32>)> {
        let mut table = Self::new();
        let mut ctr_nand_sector = None;

        for (slot, part) in header.partitions.iter().enumerate() {
            let fs_type = header.fs_types[slot];
            let index = table.add(part.offset, part.size, fs_type)?;
            table.entries[index].crypt_type = header.crypt_types[slot];

            match FsType::from(fs_type) {
                FsType::Normal if slot == TWL_NAND_SLOT => {
                    table.set_keyslot(index, KEYSLOT_TWL_NAND)?;
                    table.set_name(index, "twln")?;
                }
                FsType::Normal if slot == CTR_NAND_SLOT => {
                    let keyslot = if new_hardware {
                        KEYSLOT_CTR_NAND_NEW
                    } else {
                        KEYSLOT_CTR_NAND_OLD
                    };
                    table.set_keyslot(index, keyslot)?;
                    table.set_name(index, "nand")?;
                    ctr_nand_sector = Some(part.offset);
                }
                FsType::Normal => {}
                FsType::Firm => {
                    // Only two FIRM partitions exist on retail units.
                    table.set_keyslot(index, KEYSLOT_FIRM)?;
                    let name = if table.index_of("firm0").is_some() {
                        "firm1"
                    } else {
                        "firm0"
                    };
                    table.set_name(index, name)?;
                }
                FsType::AgbSave => {
                    table.set_keyslot(index, KEYSLOT_AGB_SAVE)?;
                    table.set_name(index, "agb")?;
                }
                FsType::Unused | FsType::Unknown(_) => {
                    table.set_keyslot(index, KEYSLOT_INVALID)?;
                    table.set_name(index, "invalid")?;
                }
            }

            let p = &table.entries[index];
            debug!(
                "partition {slot}: {:<7} start 0x{:08X} count 0x{:08X} type {} keyslot 0x{:02X}",
                p.name.as_str(),
                p.start_sector,
                p.sector_count,
                p.fs_type,
                p.keyslot
            );
        }

        info!(
            "partition table: {} entries, ctr-nand at {:?}",
            table.len(),
            ctr_nand_sector
        );
        Ok((table, ctr_nand_sector))
    }
}
