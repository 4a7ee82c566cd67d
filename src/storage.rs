//! The storage context: every backend plus the NAND crypto state.
//!
//! A [`Storage`] owns the SD/MMC transport (with its `sd`, `rnand` and
//! `dnand` identities) and the SPI flash for the whole process lifetime.
//! Callers borrow a backend by [`DeviceTag`] and drive it through
//! [`BlockDevice`].
//!
//! ```ignore
//! let mut storage = Storage::new(bus, flash, StorageConfig::load(cfg)?)?;
//! let mut nand = storage.device(DeviceTag::DecryptedNand);
//! nand.read_sectors(sector, 1, &mut buf)?;
//! ```

use log::debug;

use crate::config::StorageConfig;
use crate::device::nand_crypt::{DecryptedNand, NandCrypto};
use crate::device::sdmmc::{RawNand, SdCard, Sdmmc, SdmmcBus};
use crate::device::spiflash::{SpiFlashBus, WifiFlash};
use crate::device::{BlockDevice, DeviceTag};
use crate::partition::{Partition, PartitionTable};
use crate::Result;

/// Process-wide storage state.
#[derive(Debug)]
pub struct Storage<B, F> {
    sdmmc: Sdmmc<B>,
    flash: WifiFlash<F>,
}

impl<B: SdmmcBus, F: SpiFlashBus> Storage<B, F> {
    /// Build the context and write the provisioned keys into the AES unit.
    ///
    /// No medium is touched until a device is initialized or accessed.
    pub fn new(bus: B, flash: F, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let mut crypt = NandCrypto::new(config.identity, config.write_scratch_size);
        config.keys.apply(crypt.engine_mut())?;
        debug!(
            "storage: scratch {} bytes, sd detect timeout {} ms",
            config.write_scratch_size, config.sd_detect_timeout_ms
        );
        Ok(Self {
            sdmmc: Sdmmc::new(bus, crypt, config.sd_detect_timeout_ms),
            flash: WifiFlash::new(flash),
        })
    }

    /// Borrow the backend selected by `tag`.
    pub fn device(&mut self, tag: DeviceTag) -> Device<'_, B, F> {
        match tag {
            DeviceTag::Sd => Device::Sd(self.sdmmc.sd()),
            DeviceTag::RawNand => Device::RawNand(self.sdmmc.raw_nand()),
            DeviceTag::DecryptedNand => Device::DecryptedNand(self.sdmmc.decrypted_nand()),
            DeviceTag::SpiFlash => Device::SpiFlash(&mut self.flash),
        }
    }

    /// Partition table of the decrypted NAND. Empty until bootstrapped.
    pub fn partitions(&self) -> &PartitionTable {
        self.sdmmc.crypt().partitions()
    }

    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions().by_name(name)
    }

    /// Start sector of CTR-NAND, once the decrypted NAND is bootstrapped.
    pub fn ctr_nand_sector(&self) -> Option<u32> {
        self.sdmmc.crypt().ctr_nand_sector()
    }

    pub fn nand_crypto(&self) -> &NandCrypto {
        self.sdmmc.crypt()
    }

    pub fn sdmmc_bus(&self) -> &B {
        self.sdmmc.bus()
    }

    pub fn sdmmc_bus_mut(&mut self) -> &mut B {
        self.sdmmc.bus_mut()
    }

    pub fn flash_bus(&self) -> &F {
        self.flash.bus()
    }

    pub fn flash_bus_mut(&mut self) -> &mut F {
        self.flash.bus_mut()
    }
}

/// A borrowed backend.
#[derive(Debug)]
pub enum Device<'a, B, F> {
    Sd(SdCard<'a, B>),
    RawNand(RawNand<'a, B>),
    DecryptedNand(DecryptedNand<'a, B>),
    SpiFlash(&'a mut WifiFlash<F>),
}

macro_rules! each_device {
    ($self:expr, $dev:ident => $body:expr) => {
        match $self {
            Device::Sd($dev) => $body,
            Device::RawNand($dev) => $body,
            Device::DecryptedNand($dev) => $body,
            Device::SpiFlash($dev) => $body,
        }
    };
}

impl<B: SdmmcBus, F: SpiFlashBus> Device<'_, B, F> {
    pub fn tag(&self) -> DeviceTag {
        match self {
            Device::Sd(_) => DeviceTag::Sd,
            Device::RawNand(_) => DeviceTag::RawNand,
            Device::DecryptedNand(_) => DeviceTag::DecryptedNand,
            Device::SpiFlash(_) => DeviceTag::SpiFlash,
        }
    }
}

impl<B: SdmmcBus, F: SpiFlashBus> BlockDevice for Device<'_, B, F> {
    fn name(&self) -> &'static str {
        each_device!(self, d => d.name())
    }

    fn is_initialized(&self) -> bool {
        each_device!(self, d => d.is_initialized())
    }

    fn init(&mut self) -> Result<()> {
        each_device!(self, d => d.init())
    }

    fn read_sectors(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()> {
        each_device!(self, d => d.read_sectors(sector, count, buf))
    }

    fn write_sectors(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<()> {
        each_device!(self, d => d.write_sectors(sector, count, buf))
    }

    fn close(&mut self) {
        each_device!(self, d => d.close())
    }

    fn is_active(&mut self) -> bool {
        each_device!(self, d => d.is_active())
    }

    fn sector_count(&self) -> Result<u32> {
        each_device!(self, d => d.sector_count())
    }
}
