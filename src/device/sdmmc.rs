//! SD card and raw NAND on the shared SD/MMC transport.
//!
//! One controller serves both the SD slot and the NAND chip. Switching the
//! controller between them means resetting it, so the logical identities
//! (`sd`, `rnand` and `dnand`) are mutually exclusive:
//!
//! * bringing up `sd` resets the transport and clears all three flags;
//! * bringing up a NAND identity while `sd` is up, or while nothing is up,
//!   does the same;
//! * `rnand` and `dnand` are the same physical identity, so `dnand` bring-up
//!   reuses an already initialized `rnand`.
//!
//! The register-level transport lives behind [`SdmmcBus`].

use log::{debug, info, warn};

use super::nand_crypt::{DecryptedNand, NandCrypto};
use super::{BlockDevice, transfer_len};
use crate::{Error, Result};

/// Physical SD/MMC controller.
///
/// Sector transfers report failures as [`Error::Io`].
pub trait SdmmcBus {
    /// Reset the controller and forget every card state.
    fn reset(&mut self);

    /// Route the controller to the SD slot.
    fn enable_sd_slot(&mut self);

    /// Level of the SD card-detect signal.
    fn card_detect(&mut self) -> bool;

    /// Busy-wait for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);

    /// Run the SD card initialization sequence.
    fn init_sd(&mut self) -> Result<()>;

    /// Run the eMMC initialization sequence.
    fn init_nand(&mut self) -> Result<()>;

    fn read_sd(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()>;
    fn write_sd(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<()>;
    fn read_nand(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()>;
    fn write_nand(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<()>;

    /// Capacity of the SD card reported during init.
    fn sd_sector_count(&self) -> u32;

    /// Capacity of the NAND chip reported during init.
    fn nand_sector_count(&self) -> u32;
}

/// Transport state shared by the `sd`, `rnand` and `dnand` identities.
#[derive(Debug)]
pub struct Sdmmc<B> {
    pub(crate) bus: B,
    sd_ready: bool,
    pub(crate) nand_ready: bool,
    pub(crate) crypt: NandCrypto,
    sd_detect_timeout_ms: u32,
}

impl<B: SdmmcBus> Sdmmc<B> {
    pub(crate) fn new(bus: B, crypt: NandCrypto, sd_detect_timeout_ms: u32) -> Self {
        Self {
            bus,
            sd_ready: false,
            nand_ready: false,
            crypt,
            sd_detect_timeout_ms,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// NAND crypto state (partition table, domains, AES unit).
    pub fn crypt(&self) -> &NandCrypto {
        &self.crypt
    }

    pub fn crypt_mut(&mut self) -> &mut NandCrypto {
        &mut self.crypt
    }

    pub fn sd(&mut self) -> SdCard<'_, B> {
        SdCard(self)
    }

    pub fn raw_nand(&mut self) -> RawNand<'_, B> {
        RawNand(self)
    }

    pub fn decrypted_nand(&mut self) -> DecryptedNand<'_, B> {
        DecryptedNand::new(self)
    }

    fn reset_transport(&mut self) {
        debug!("sdmmc: transport reset");
        self.bus.reset();
        self.sd_ready = false;
        self.nand_ready = false;
        self.crypt.invalidate();
    }

    pub(crate) fn init_sd(&mut self) -> Result<()> {
        if self.sd_ready {
            return Ok(());
        }
        self.reset_transport();
        self.bus.enable_sd_slot();

        if !self.bus.card_detect() {
            // Give the bus time to settle before deciding the slot is empty.
            self.bus.delay_ms(self.sd_detect_timeout_ms);
            if !self.bus.card_detect() {
                warn!("sd: no card inserted");
                return Err(Error::NoMedium);
            }
        }

        if let Err(e) = self.bus.init_sd() {
            warn!("sd: card init failed: {e}");
            return Err(e);
        }
        self.sd_ready = true;
        info!("sd: ready, {} sectors", self.bus.sd_sector_count());
        Ok(())
    }

    /// Bring up the NAND identity. `dnand` relies on this too.
    pub(crate) fn init_raw_nand(&mut self) -> Result<()> {
        if self.nand_ready {
            return Ok(());
        }
        // NAND not up means either the SD identity or nothing is active.
        self.reset_transport();

        if let Err(e) = self.bus.init_nand() {
            warn!("rnand: init failed: {e}");
            return Err(e);
        }
        self.nand_ready = true;
        info!("rnand: ready, {} sectors", self.bus.nand_sector_count());
        Ok(())
    }
}

/// The `sd` identity.
#[derive(Debug)]
pub struct SdCard<'a, B>(&'a mut Sdmmc<B>);

impl<B: SdmmcBus> BlockDevice for SdCard<'_, B> {
    fn name(&self) -> &'static str {
        "sd"
    }

    fn is_initialized(&self) -> bool {
        self.0.sd_ready
    }

    fn init(&mut self) -> Result<()> {
        self.0.init_sd()
    }

    fn read_sectors(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()> {
        let len = transfer_len(count, buf.len())?;
        if !self.0.sd_ready {
            return Err(Error::NotReady);
        }
        self.0.bus.read_sd(sector, count, &mut buf[..len])
    }

    fn write_sectors(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<()> {
        let len = transfer_len(count, buf.len())?;
        if !self.0.sd_ready {
            return Err(Error::NotReady);
        }
        self.0.bus.write_sd(sector, count, &buf[..len])
    }

    fn close(&mut self) {
        self.0.sd_ready = false;
    }

    fn is_active(&mut self) -> bool {
        self.0.bus.card_detect()
    }

    fn sector_count(&self) -> Result<u32> {
        if !self.0.sd_ready {
            return Err(Error::NotReady);
        }
        Ok(self.0.bus.sd_sector_count())
    }
}

/// The `rnand` identity: NAND sectors exactly as stored.
///
/// Reads and writes bring the NAND up on demand.
#[derive(Debug)]
pub struct RawNand<'a, B>(&'a mut Sdmmc<B>);

impl<B: SdmmcBus> BlockDevice for RawNand<'_, B> {
    fn name(&self) -> &'static str {
        "rnand"
    }

    fn is_initialized(&self) -> bool {
        self.0.nand_ready
    }

    fn init(&mut self) -> Result<()> {
        self.0.init_raw_nand()
    }

    fn read_sectors(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()> {
        let len = transfer_len(count, buf.len())?;
        self.0.init_raw_nand()?;
        self.0.bus.read_nand(sector, count, &mut buf[..len])
    }

    fn write_sectors(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<()> {
        let len = transfer_len(count, buf.len())?;
        self.0.init_raw_nand()?;
        self.0.bus.write_nand(sector, count, &buf[..len])
    }

    fn close(&mut self) {
        self.0.nand_ready = false;
    }

    fn is_active(&mut self) -> bool {
        self.0.nand_ready
    }

    fn sector_count(&self) -> Result<u32> {
        if !self.0.nand_ready {
            return Err(Error::NotReady);
        }
        Ok(self.0.bus.nand_sector_count())
    }
}
