//! **bootstore** - the storage core of a console bootloader.
//!
//! Raw storage media (SD card, NAND, SPI flash) become uniform, partition
//! aware block devices; the NAND additionally decrypts and re-encrypts itself
//! on the fly. A command dispatcher exposes filesystem operations over those
//! devices to the companion processor.
//!
//! # Layout
//! | Module | Contents |
//! |--------|----------|
//! | [`device`]    | [`device::BlockDevice`] backends: `sd`, `rnand`, `dnand`, `nvram` |
//! | [`partition`] | partition table and keyslot classification |
//! | [`formats`]   | NCSD volume header parser |
//! | [`crypto`]    | keyslot AES unit model, key scrambler, SHA unit |
//! | [`keys`]      | provisioned keyslot material |
//! | [`config`]    | console identity and tunables |
//! | [`storage`]   | [`Storage`] context owning every backend |
//! | [`ipc`]       | command decoding and the [`ipc::Dispatcher`] |
//!
//! The physical transports, the filesystem and processor housekeeping are
//! supplied by the caller through [`device::sdmmc::SdmmcBus`],
//! [`device::spiflash::SpiFlashBus`], [`ipc::FsSurface`] and [`ipc::Hal`].

pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod formats;
pub mod ipc;
pub mod keys;
pub mod partition;
pub mod storage;
pub(crate) mod utils;

pub use config::{ConsoleIdentity, StorageConfig};
pub use device::{BlockDevice, DeviceTag, SECTOR_SIZE};
pub use error::{Error, Result};
pub use storage::{Device, Storage};
