//! Command dispatch.
//!
//! [`Dispatcher::handle_cmd`] runs one command to completion:
//!
//! 1. decode the id and arguments; anything malformed is a protocol
//!    violation and ends in [`Hal::fatal`] before any cache maintenance;
//! 2. invalidate the data cache over every active input buffer;
//! 3. run the mapped call on the [`FsSurface`] (or handle it locally);
//! 4. flush and invalidate the data cache over every active output buffer.
//!
//! The returned word is the command result as the companion processor sees
//! it.

use log::{error, trace};

use super::IpcBuffer;
use super::command::{CommandId, Request, cmd_id, cmd_in_bufs, cmd_out_bufs};
use crate::Storage;
use crate::device::sdmmc::SdmmcBus;
use crate::device::spiflash::SpiFlashBus;
use crate::device::{BlockDevice, DeviceTag};

/// Processor housekeeping the dispatcher needs.
pub trait Hal {
    fn invalidate_dcache_range(&mut self, ptr: u32, size: u32);
    fn flush_invalidate_dcache_range(&mut self, ptr: u32, size: u32);

    /// Boot environment register.
    fn boot_env(&self) -> u32;

    /// Unrecoverable fault. Never returns.
    fn fatal(&mut self) -> !;
}

/// Filesystem operations reachable over the command channel.
///
/// Return values are the raw result words sent back to the companion
/// processor. Paths and data live in shared memory and are passed as
/// descriptors.
pub trait FsSurface<B: SdmmcBus, F: SpiFlashBus> {
    fn mount(&mut self, storage: &mut Storage<B, F>, drive: u32) -> u32;
    fn unmount(&mut self, storage: &mut Storage<B, F>, drive: u32) -> u32;
    fn is_drive_mounted(&mut self, storage: &mut Storage<B, F>, drive: u32) -> u32;
    fn get_free(&mut self, storage: &mut Storage<B, F>, drive: u32, out: IpcBuffer) -> u32;

    /// Sector count of device `dev`, or `0` when it is unknown or not up.
    fn device_size(&mut self, storage: &mut Storage<B, F>, dev: u32) -> u32 {
        DeviceTag::from_index(dev)
            .and_then(|tag| storage.device(tag).sector_count().ok())
            .unwrap_or(0)
    }

    /// `1` if the medium of device `dev` is present.
    fn is_device_active(&mut self, storage: &mut Storage<B, F>, dev: u32) -> u32 {
        DeviceTag::from_index(dev).is_some_and(|tag| storage.device(tag).is_active()) as u32
    }

    fn prepare_raw_access(&mut self, storage: &mut Storage<B, F>, dev: u32) -> u32;
    fn finalize_raw_access(&mut self, storage: &mut Storage<B, F>, handle: u32) -> u32;
    fn create_device_buffer(&mut self, storage: &mut Storage<B, F>, size: u32) -> u32;
    fn free_device_buffer(&mut self, storage: &mut Storage<B, F>, handle: u32) -> u32;
    fn read_to_device_buffer(
        &mut self,
        storage: &mut Storage<B, F>,
        fd: u32,
        offset: u32,
        size: u32,
        handle: u32,
    ) -> u32;
    fn write_from_device_buffer(
        &mut self,
        storage: &mut Storage<B, F>,
        fd: u32,
        offset: u32,
        size: u32,
        handle: u32,
    ) -> u32;

    fn open(&mut self, storage: &mut Storage<B, F>, path: IpcBuffer, mode: u32) -> u32;
    fn read(&mut self, storage: &mut Storage<B, F>, fd: u32, buf: IpcBuffer) -> u32;
    fn write(&mut self, storage: &mut Storage<B, F>, fd: u32, buf: IpcBuffer) -> u32;
    fn sync(&mut self, storage: &mut Storage<B, F>, fd: u32) -> u32;
    fn lseek(&mut self, storage: &mut Storage<B, F>, fd: u32, offset: u32) -> u32;
    fn tell(&mut self, storage: &mut Storage<B, F>, fd: u32) -> u32;
    fn size(&mut self, storage: &mut Storage<B, F>, fd: u32) -> u32;
    fn close(&mut self, storage: &mut Storage<B, F>, fd: u32) -> u32;
    fn expand(&mut self, storage: &mut Storage<B, F>, fd: u32, size: u32) -> u32;
    fn stat(&mut self, storage: &mut Storage<B, F>, path: IpcBuffer, out: IpcBuffer) -> u32;

    fn open_dir(&mut self, storage: &mut Storage<B, F>, path: IpcBuffer) -> u32;
    fn read_dir(
        &mut self,
        storage: &mut Storage<B, F>,
        dd: u32,
        out: IpcBuffer,
        max_entries: u32,
    ) -> u32;
    fn close_dir(&mut self, storage: &mut Storage<B, F>, dd: u32) -> u32;
    fn mkdir(&mut self, storage: &mut Storage<B, F>, path: IpcBuffer) -> u32;
    fn rename(&mut self, storage: &mut Storage<B, F>, old: IpcBuffer, new: IpcBuffer) -> u32;
    fn unlink(&mut self, storage: &mut Storage<B, F>, path: IpcBuffer) -> u32;

    fn verify_nand_image(&mut self, storage: &mut Storage<B, F>, path: IpcBuffer) -> u32;
    fn set_nand_protection(&mut self, storage: &mut Storage<B, F>, protect: bool) -> u32;
    fn write_firm_partition(
        &mut self,
        storage: &mut Storage<B, F>,
        path: IpcBuffer,
        replace_sig: bool,
    ) -> u32;
    fn load_verify_firm(&mut self, storage: &mut Storage<B, F>, path: IpcBuffer, max_size: u32)
    -> u32;
    fn load_verify_update(
        &mut self,
        storage: &mut Storage<B, F>,
        path: IpcBuffer,
        version_out: IpcBuffer,
    ) -> u32;

    /// Unmount everything before power-off or a fault.
    fn deinit(&mut self, storage: &mut Storage<B, F>);
}

/// Executes commands from the companion processor.
#[derive(Debug)]
pub struct Dispatcher<H> {
    hal: H,
    launch_requested: bool,
}

impl<H: Hal> Dispatcher<H> {
    pub fn new(hal: H) -> Self {
        Self {
            hal,
            launch_requested: false,
        }
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Whether a firmware launch was requested and not yet taken.
    pub fn launch_requested(&self) -> bool {
        self.launch_requested
    }

    /// Consume a pending firmware launch request.
    pub fn take_launch_request(&mut self) -> bool {
        std::mem::take(&mut self.launch_requested)
    }

    /// Run the command packed in the command word `cmd`.
    pub fn handle_cmd_word<B, F, S>(
        &mut self,
        storage: &mut Storage<B, F>,
        fs: &mut S,
        cmd: u32,
        words: &[u32],
    ) -> u32
    where
        B: SdmmcBus,
        F: SpiFlashBus,
        S: FsSurface<B, F>,
    {
        self.handle_cmd(
            storage,
            fs,
            cmd_id(cmd),
            u32::from(cmd_in_bufs(cmd)),
            u32::from(cmd_out_bufs(cmd)),
            words,
        )
    }

    /// Run one command. Unknown ids and short argument arrays never return.
    pub fn handle_cmd<B, F, S>(
        &mut self,
        storage: &mut Storage<B, F>,
        fs: &mut S,
        cmd_id: u8,
        in_bufs: u32,
        out_bufs: u32,
        words: &[u32],
    ) -> u32
    where
        B: SdmmcBus,
        F: SpiFlashBus,
        S: FsSurface<B, F>,
    {
        let Ok(id) = CommandId::try_from(cmd_id) else {
            error!("ipc: unknown command id {cmd_id:#04x}");
            self.hal.fatal()
        };
        let (in_bufs, out_bufs) = (in_bufs as usize, out_bufs as usize);
        let descriptors = in_bufs.saturating_add(out_bufs);
        if descriptors.saturating_mul(2) > words.len() {
            error!(
                "ipc: {id:?} names {descriptors} buffers but only {} words were sent",
                words.len()
            );
            self.hal.fatal()
        }
        let Some(req) = Request::decode(id, words) else {
            error!("ipc: {id:?} needs {} words, got {}", id.word_count(), words.len());
            self.hal.fatal()
        };
        trace!("ipc: {req:?}");

        for b in (0..in_bufs).filter_map(|i| IpcBuffer::from_words(words, i)) {
            if b.is_active() {
                self.hal.invalidate_dcache_range(b.ptr, b.size);
            }
        }

        let result = self.execute(storage, fs, req);

        for b in (in_bufs..descriptors).filter_map(|i| IpcBuffer::from_words(words, i)) {
            if b.is_active() {
                self.hal.flush_invalidate_dcache_range(b.ptr, b.size);
            }
        }

        result
    }

    fn execute<B, F, S>(&mut self, st: &mut Storage<B, F>, fs: &mut S, req: Request) -> u32
    where
        B: SdmmcBus,
        F: SpiFlashBus,
        S: FsSurface<B, F>,
    {
        match req {
            Request::Mount { drive } => fs.mount(st, drive),
            Request::Unmount { drive } => fs.unmount(st, drive),
            Request::IsDriveMounted { drive } => fs.is_drive_mounted(st, drive),
            Request::GetFree { drive, out } => fs.get_free(st, drive, out),
            Request::GetDevSize { dev } => fs.device_size(st, dev),
            Request::IsDevActive { dev } => fs.is_device_active(st, dev),
            Request::PrepRawAccess { dev } => fs.prepare_raw_access(st, dev),
            Request::FinalRawAccess { handle } => fs.finalize_raw_access(st, handle),
            Request::CreateDevBuf { size } => fs.create_device_buffer(st, size),
            Request::FreeDevBuf { handle } => fs.free_device_buffer(st, handle),
            Request::ReadToDevBuf {
                fd,
                offset,
                size,
                handle,
            } => fs.read_to_device_buffer(st, fd, offset, size, handle),
            Request::WriteFromDevBuf {
                fd,
                offset,
                size,
                handle,
            } => fs.write_from_device_buffer(st, fd, offset, size, handle),
            Request::Open { path, mode } => fs.open(st, path, mode),
            Request::Read { fd, buf } => fs.read(st, fd, buf),
            Request::Write { fd, buf } => fs.write(st, fd, buf),
            Request::Sync { fd } => fs.sync(st, fd),
            Request::Lseek { fd, offset } => fs.lseek(st, fd, offset),
            Request::Tell { fd } => fs.tell(st, fd),
            Request::Size { fd } => fs.size(st, fd),
            Request::Close { fd } => fs.close(st, fd),
            Request::Expand { fd, size } => fs.expand(st, fd, size),
            Request::Stat { path, out } => fs.stat(st, path, out),
            Request::OpenDir { path } => fs.open_dir(st, path),
            Request::ReadDir {
                dd,
                out,
                max_entries,
            } => fs.read_dir(st, dd, out, max_entries),
            Request::CloseDir { dd } => fs.close_dir(st, dd),
            Request::Mkdir { path } => fs.mkdir(st, path),
            Request::Rename { old, new } => fs.rename(st, old, new),
            Request::Unlink { path } => fs.unlink(st, path),
            Request::VerifyNandImage { path } => fs.verify_nand_image(st, path),
            Request::SetNandProtection { protect } => fs.set_nand_protection(st, protect),
            Request::WriteFirmPartition { path, replace_sig } => {
                fs.write_firm_partition(st, path, replace_sig)
            }
            Request::LoadVerifyFirm { path, max_size } => fs.load_verify_firm(st, path, max_size),
            Request::LoadVerifyUpdate { path, version_out } => {
                fs.load_verify_update(st, path, version_out)
            }
            Request::FirmLaunch => {
                self.launch_requested = true;
                0
            }
            Request::GetBootEnv => self.hal.boot_env(),
            Request::PreparePower | Request::Panic | Request::Exception => {
                fs.deinit(st);
                0
            }
        }
    }
}
