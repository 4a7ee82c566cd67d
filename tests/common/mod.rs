//! In-memory transports and collaborators shared by the integration tests.
#![allow(dead_code)]

use bootstore::crypto::engine::KeyType;
use bootstore::device::sdmmc::SdmmcBus;
use bootstore::device::spiflash::{SPI_FLASH_SIZE, SpiFlashBus};
use bootstore::ipc::{FsSurface, Hal, IpcBuffer};
use bootstore::keys::KeyStore;
use bootstore::{
    BlockDevice, ConsoleIdentity, DeviceTag, Error, Result, SECTOR_SIZE, Storage, StorageConfig,
};

pub const NAND_SECTORS: u32 = 0xC0;

pub const TWLN_START: u32 = 0x10;
pub const TWLN_SIZE: u32 = 0x20;
pub const AGB_START: u32 = 0x30;
pub const AGB_SIZE: u32 = 0x08;
pub const FIRM0_START: u32 = 0x38;
pub const FIRM1_START: u32 = 0x48;
pub const FIRM_SIZE: u32 = 0x10;
pub const CTRNAND_START: u32 = 0x60;
pub const CTRNAND_SIZE: u32 = 0x40;
pub const BOGUS_START: u32 = 0xA0;
pub const BOGUS_SIZE: u32 = 0x10;

pub const SD_SECTORS: u32 = 0x40;

pub fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

/// Every call the storage core makes on the SD/MMC transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCall {
    Reset,
    EnableSdSlot,
    Delay(u32),
    InitSd,
    InitNand,
    ReadSd(u32, u32),
    WriteSd(u32, u32),
    ReadNand(u32, u32),
    WriteNand(u32, u32),
}

#[derive(Debug)]
pub struct MockBus {
    pub sd: Vec<u8>,
    pub nand: Vec<u8>,
    pub card_present: bool,
    /// The card shows up once the driver has waited for it.
    pub card_after_delay: bool,
    pub fail_init_nand: bool,
    /// Fail the raw NAND write with this index (0-based).
    pub fail_nand_write: Option<usize>,
    pub calls: Vec<BusCall>,
    nand_writes: usize,
}

impl MockBus {
    pub fn new(nand: Vec<u8>) -> Self {
        Self {
            sd: (0..SD_SECTORS as usize * SECTOR_SIZE)
                .map(|i| (i / SECTOR_SIZE) as u8)
                .collect(),
            nand,
            card_present: true,
            card_after_delay: false,
            fail_init_nand: false,
            fail_nand_write: None,
            calls: Vec::new(),
            nand_writes: 0,
        }
    }

    pub fn count(&self, call: BusCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    pub fn nand_writes(&self) -> Vec<(u32, u32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BusCall::WriteNand(s, n) => Some((*s, *n)),
                _ => None,
            })
            .collect()
    }

    pub fn nand_sector(&self, sector: u32) -> &[u8] {
        let start = sector as usize * SECTOR_SIZE;
        &self.nand[start..start + SECTOR_SIZE]
    }

    fn range(image: &[u8], sector: u32, count: u32) -> Result<std::ops::Range<usize>> {
        let start = sector as usize * SECTOR_SIZE;
        let end = start + count as usize * SECTOR_SIZE;
        if end > image.len() {
            return Err(Error::Io("out of bounds"));
        }
        Ok(start..end)
    }
}

impl SdmmcBus for MockBus {
    fn reset(&mut self) {
        self.calls.push(BusCall::Reset);
    }

    fn enable_sd_slot(&mut self) {
        self.calls.push(BusCall::EnableSdSlot);
    }

    fn card_detect(&mut self) -> bool {
        self.card_present
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(BusCall::Delay(ms));
        if self.card_after_delay {
            self.card_present = true;
        }
    }

    fn init_sd(&mut self) -> Result<()> {
        self.calls.push(BusCall::InitSd);
        Ok(())
    }

    fn init_nand(&mut self) -> Result<()> {
        self.calls.push(BusCall::InitNand);
        if self.fail_init_nand {
            return Err(Error::Io("emmc init"));
        }
        Ok(())
    }

    fn read_sd(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()> {
        self.calls.push(BusCall::ReadSd(sector, count));
        let r = Self::range(&self.sd, sector, count)?;
        buf.copy_from_slice(&self.sd[r]);
        Ok(())
    }

    fn write_sd(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<()> {
        self.calls.push(BusCall::WriteSd(sector, count));
        let r = Self::range(&self.sd, sector, count)?;
        self.sd[r].copy_from_slice(buf);
        Ok(())
    }

    fn read_nand(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()> {
        self.calls.push(BusCall::ReadNand(sector, count));
        let r = Self::range(&self.nand, sector, count)?;
        buf.copy_from_slice(&self.nand[r]);
        Ok(())
    }

    fn write_nand(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<()> {
        self.calls.push(BusCall::WriteNand(sector, count));
        let index = self.nand_writes;
        self.nand_writes += 1;
        if self.fail_nand_write == Some(index) {
            return Err(Error::Io("write timeout"));
        }
        let r = Self::range(&self.nand, sector, count)?;
        self.nand[r].copy_from_slice(buf);
        Ok(())
    }

    fn sd_sector_count(&self) -> u32 {
        SD_SECTORS
    }

    fn nand_sector_count(&self) -> u32 {
        (self.nand.len() / SECTOR_SIZE) as u32
    }
}

#[derive(Debug)]
pub struct MockFlash {
    pub present: bool,
    pub data: Vec<u8>,
    pub reads: Vec<(u32, usize)>,
}

impl MockFlash {
    pub fn new() -> Self {
        Self {
            present: true,
            data: (0..SPI_FLASH_SIZE).map(|i| (i ^ (i >> 8)) as u8).collect(),
            reads: Vec::new(),
        }
    }
}

impl SpiFlashBus for MockFlash {
    fn status(&mut self) -> bool {
        self.present
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        self.reads.push((offset, buf.len()));
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}

fn put_slot(sector0: &mut [u8], slot: usize, fs_type: u8, offset: u32, size: u32) {
    sector0[0x110 + slot] = fs_type;
    let at = 0x120 + slot * 8;
    sector0[at..at + 4].copy_from_slice(&offset.to_le_bytes());
    sector0[at + 4..at + 8].copy_from_slice(&size.to_le_bytes());
}

/// A NAND image with a retail-like NCSD header and recognisable raw data.
pub fn nand_image() -> Vec<u8> {
    let mut img: Vec<u8> = (0..NAND_SECTORS as usize * SECTOR_SIZE)
        .map(|i| (i % 251) as u8)
        .collect();
    let s0 = &mut img[..SECTOR_SIZE];
    s0.fill(0);
    s0[0x100..0x104].copy_from_slice(b"NCSD");
    s0[0x104..0x108].copy_from_slice(&NAND_SECTORS.to_le_bytes());
    put_slot(s0, 0, 1, TWLN_START, TWLN_SIZE);
    put_slot(s0, 1, 4, AGB_START, AGB_SIZE);
    put_slot(s0, 2, 3, FIRM0_START, FIRM_SIZE);
    put_slot(s0, 3, 3, FIRM1_START, FIRM_SIZE);
    put_slot(s0, 4, 1, CTRNAND_START, CTRNAND_SIZE);
    put_slot(s0, 5, 2, BOGUS_START, BOGUS_SIZE);
    img
}

pub fn identity() -> ConsoleIdentity {
    ConsoleIdentity {
        nand_cid: core::array::from_fn(|i| 0x90 + i as u8),
        twl_console_id: [0x0812_3456, 0x789A_BCDE],
        twl_key_y: [0xE01A_4E00, 0x1234_5678, 0x0000_0001],
        new_hardware: false,
    }
}

pub fn keys() -> KeyStore {
    let mut ks = KeyStore::new();
    for slot in [0x04u8, 0x06, 0x07] {
        ks.set(slot, KeyType::Normal, [slot.wrapping_mul(0x11); 16])
            .unwrap();
    }
    ks
}

pub fn config() -> StorageConfig {
    StorageConfig::new(identity(), keys())
}

pub type TestStorage = Storage<MockBus, MockFlash>;

pub fn storage_with(nand: Vec<u8>, config: StorageConfig) -> TestStorage {
    init_logger();
    Storage::new(MockBus::new(nand), MockFlash::new(), config).unwrap()
}

pub fn storage() -> TestStorage {
    storage_with(nand_image(), config())
}

pub fn pattern(sectors: u32, seed: u8) -> Vec<u8> {
    (0..sectors as usize * SECTOR_SIZE)
        .map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalCall {
    Invalidate(u32, u32),
    FlushInvalidate(u32, u32),
}

/// Records cache maintenance; `fatal` unwinds so tests can observe it.
#[derive(Debug, Default)]
pub struct MockHal {
    pub calls: Vec<HalCall>,
    pub boot_env: u32,
}

impl Hal for MockHal {
    fn invalidate_dcache_range(&mut self, ptr: u32, size: u32) {
        self.calls.push(HalCall::Invalidate(ptr, size));
    }

    fn flush_invalidate_dcache_range(&mut self, ptr: u32, size: u32) {
        self.calls.push(HalCall::FlushInvalidate(ptr, size));
    }

    fn boot_env(&self) -> u32 {
        self.boot_env
    }

    fn fatal(&mut self) -> ! {
        panic!("fatal fault");
    }
}

/// Filesystem stand-in: logs every call and answers with `ret`.
#[derive(Debug, Default)]
pub struct MockFs {
    pub log: Vec<String>,
    pub ret: u32,
    pub deinit_count: usize,
}

impl MockFs {
    fn call(&mut self, entry: String) -> u32 {
        self.log.push(entry);
        self.ret
    }
}

impl FsSurface<MockBus, MockFlash> for MockFs {
    fn mount(&mut self, storage: &mut TestStorage, drive: u32) -> u32 {
        self.log.push(format!("mount {drive}"));
        DeviceTag::from_index(drive).is_some_and(|t| storage.device(t).init().is_ok()) as u32
    }

    fn unmount(&mut self, storage: &mut TestStorage, drive: u32) -> u32 {
        self.log.push(format!("unmount {drive}"));
        if let Some(t) = DeviceTag::from_index(drive) {
            storage.device(t).close();
        }
        1
    }

    fn is_drive_mounted(&mut self, storage: &mut TestStorage, drive: u32) -> u32 {
        self.log.push(format!("mounted? {drive}"));
        DeviceTag::from_index(drive).is_some_and(|t| storage.device(t).is_initialized()) as u32
    }

    fn get_free(&mut self, _: &mut TestStorage, drive: u32, out: IpcBuffer) -> u32 {
        self.call(format!("getfree {drive} {out:?}"))
    }

    fn prepare_raw_access(&mut self, _: &mut TestStorage, dev: u32) -> u32 {
        self.call(format!("prep_raw {dev}"))
    }

    fn finalize_raw_access(&mut self, _: &mut TestStorage, handle: u32) -> u32 {
        self.call(format!("final_raw {handle}"))
    }

    fn create_device_buffer(&mut self, _: &mut TestStorage, size: u32) -> u32 {
        self.call(format!("create_buf {size}"))
    }

    fn free_device_buffer(&mut self, _: &mut TestStorage, handle: u32) -> u32 {
        self.call(format!("free_buf {handle}"))
    }

    fn read_to_device_buffer(
        &mut self,
        _: &mut TestStorage,
        fd: u32,
        offset: u32,
        size: u32,
        handle: u32,
    ) -> u32 {
        self.call(format!("read_to_buf {fd} {offset} {size} {handle}"))
    }

    fn write_from_device_buffer(
        &mut self,
        _: &mut TestStorage,
        fd: u32,
        offset: u32,
        size: u32,
        handle: u32,
    ) -> u32 {
        self.call(format!("write_from_buf {fd} {offset} {size} {handle}"))
    }

    fn open(&mut self, _: &mut TestStorage, path: IpcBuffer, mode: u32) -> u32 {
        self.call(format!("open {:#x}/{} {mode}", path.ptr, path.size))
    }

    fn read(&mut self, _: &mut TestStorage, fd: u32, buf: IpcBuffer) -> u32 {
        self.call(format!("read {fd} {:#x}/{}", buf.ptr, buf.size))
    }

    fn write(&mut self, _: &mut TestStorage, fd: u32, buf: IpcBuffer) -> u32 {
        self.call(format!("write {fd} {:#x}/{}", buf.ptr, buf.size))
    }

    fn sync(&mut self, _: &mut TestStorage, fd: u32) -> u32 {
        self.call(format!("sync {fd}"))
    }

    fn lseek(&mut self, _: &mut TestStorage, fd: u32, offset: u32) -> u32 {
        self.call(format!("lseek {fd} {offset}"))
    }

    fn tell(&mut self, _: &mut TestStorage, fd: u32) -> u32 {
        self.call(format!("tell {fd}"))
    }

    fn size(&mut self, _: &mut TestStorage, fd: u32) -> u32 {
        self.call(format!("size {fd}"))
    }

    fn close(&mut self, _: &mut TestStorage, fd: u32) -> u32 {
        self.call(format!("close {fd}"))
    }

    fn expand(&mut self, _: &mut TestStorage, fd: u32, size: u32) -> u32 {
        self.call(format!("expand {fd} {size}"))
    }

    fn stat(&mut self, _: &mut TestStorage, path: IpcBuffer, out: IpcBuffer) -> u32 {
        self.call(format!(
            "stat {:#x}/{} {:#x}/{}",
            path.ptr, path.size, out.ptr, out.size
        ))
    }

    fn open_dir(&mut self, _: &mut TestStorage, path: IpcBuffer) -> u32 {
        self.call(format!("opendir {:#x}/{}", path.ptr, path.size))
    }

    fn read_dir(&mut self, _: &mut TestStorage, dd: u32, out: IpcBuffer, max_entries: u32) -> u32 {
        self.call(format!(
            "readdir {dd} {:#x}/{} {max_entries}",
            out.ptr, out.size
        ))
    }

    fn close_dir(&mut self, _: &mut TestStorage, dd: u32) -> u32 {
        self.call(format!("closedir {dd}"))
    }

    fn mkdir(&mut self, _: &mut TestStorage, path: IpcBuffer) -> u32 {
        self.call(format!("mkdir {:#x}/{}", path.ptr, path.size))
    }

    fn rename(&mut self, _: &mut TestStorage, old: IpcBuffer, new: IpcBuffer) -> u32 {
        self.call(format!("rename {:#x} {:#x}", old.ptr, new.ptr))
    }

    fn unlink(&mut self, _: &mut TestStorage, path: IpcBuffer) -> u32 {
        self.call(format!("unlink {:#x}", path.ptr))
    }

    fn verify_nand_image(&mut self, _: &mut TestStorage, path: IpcBuffer) -> u32 {
        self.call(format!("verify_nand {:#x}", path.ptr))
    }

    fn set_nand_protection(&mut self, _: &mut TestStorage, protect: bool) -> u32 {
        self.call(format!("nand_prot {protect}"))
    }

    fn write_firm_partition(
        &mut self,
        _: &mut TestStorage,
        path: IpcBuffer,
        replace_sig: bool,
    ) -> u32 {
        self.call(format!("write_firm {:#x} {replace_sig}", path.ptr))
    }

    fn load_verify_firm(&mut self, _: &mut TestStorage, path: IpcBuffer, max_size: u32) -> u32 {
        self.call(format!("load_firm {:#x} {max_size}", path.ptr))
    }

    fn load_verify_update(
        &mut self,
        _: &mut TestStorage,
        path: IpcBuffer,
        version_out: IpcBuffer,
    ) -> u32 {
        self.call(format!("load_update {:#x} {:#x}", path.ptr, version_out.ptr))
    }

    fn deinit(&mut self, _: &mut TestStorage) {
        self.log.push("deinit".into());
        self.deinit_count += 1;
    }
}
