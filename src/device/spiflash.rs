//! Read-only SPI flash (`nvram`).
//!
//! The wifi flash chip holds 0x20000 bytes of console configuration. It is
//! exposed as 256 sectors; writes are not supported.

use log::{info, warn};

use super::{BlockDevice, SECTOR_SHIFT, transfer_len};
use crate::{Error, Result};

/// Flash size in bytes.
pub const SPI_FLASH_SIZE: u32 = 0x2_0000;

/// Flash size in sectors.
pub const SPI_FLASH_SECTORS: u32 = SPI_FLASH_SIZE >> SECTOR_SHIFT;

/// Physical SPI flash transport.
pub trait SpiFlashBus {
    /// Probe the chip. `false` when no chip answers.
    fn status(&mut self) -> bool;

    /// Read `buf.len()` bytes starting at byte `offset`.
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<()>;
}

#[derive(Debug)]
pub struct WifiFlash<F> {
    bus: F,
    initialized: bool,
}

impl<F: SpiFlashBus> WifiFlash<F> {
    pub fn new(bus: F) -> Self {
        Self {
            bus,
            initialized: false,
        }
    }

    pub fn bus(&self) -> &F {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut F {
        &mut self.bus
    }
}

impl<F: SpiFlashBus> BlockDevice for WifiFlash<F> {
    fn name(&self) -> &'static str {
        "nvram"
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        if !self.bus.status() {
            warn!("nvram: flash not responding");
            return Err(Error::NoMedium);
        }
        self.initialized = true;
        info!("nvram: ready");
        Ok(())
    }

    fn read_sectors(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()> {
        let len = transfer_len(count, buf.len())?;
        if !self.initialized {
            return Err(Error::NotReady);
        }
        match sector.checked_add(count) {
            Some(end) if end <= SPI_FLASH_SECTORS => {}
            _ => return Err(Error::InvalidRange),
        }
        self.bus.read(sector << SECTOR_SHIFT, &mut buf[..len])
    }

    fn write_sectors(&mut self, _sector: u32, _count: u32, _buf: &[u8]) -> Result<()> {
        Err(Error::Unsupported("nvram is read-only"))
    }

    fn close(&mut self) {
        self.initialized = false;
    }

    /// Probes the chip through [`init`](BlockDevice::init) when not yet up.
    fn is_active(&mut self) -> bool {
        self.initialized || self.init().is_ok()
    }

    fn sector_count(&self) -> Result<u32> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        Ok(SPI_FLASH_SECTORS)
    }
}
