//! Transparent NAND decryption (`dnand`).
//!
//! The NAND is encrypted per partition in AES-CTR. Two counter families
//! exist:
//!
//! | Domain | Keyslot | Counter seed | Counter order | Data order |
//! |--------|---------|--------------|---------------|------------|
//! | TWL | `0x03` | SHA-1(CID), big in / big out | little, reversed | little, reversed |
//! | CTR | `0x04`-`0x07` | SHA-256(CID), big in / little out | little, normal | big, normal |
//!
//! The first 16 digest bytes form the base counter of a domain. A request at
//! `sector` starts at `base + (sector << 9) / 16` blocks, so every sector can
//! be decrypted on its own.
//!
//! ## Bootstrap
//! The first access (or an explicit `init`) brings up raw NAND, parses the
//! NCSD header in sector 0, builds the [`PartitionTable`], hashes the CID and
//! programs the TWL keyslot from the console identity. A failed bootstrap is
//! latched: later reads and writes fail without touching the NAND until
//! `init` or `close` is called again.
//!
//! ## Writes
//! Plaintext is re-encrypted through a scratch buffer of at most
//! `write_scratch_size` bytes, one chunk at a time, each chunk at its own
//! absolute counter. A failing chunk aborts the request; chunks already
//! written stay written. The TWL region is read-only here.

use log::{debug, info, trace, warn};

use super::sdmmc::{Sdmmc, SdmmcBus};
use super::{BlockDevice, SECTOR_SHIFT, SECTOR_SIZE, transfer_len};
use crate::config::ConsoleIdentity;
use crate::crypto::engine::{AesCtx, AesEngine, AesParams, KeyType};
use crate::crypto::sha::{ShaMode, ShaParams, WordOrder, sha};
use crate::formats::ncsd::Ncsd;
use crate::partition::{KEYSLOT_TWL_NAND, PartitionTable};
use crate::{Error, Result};

/// TWL key X word 0 mask.
const TWL_KEYX_ID0_XOR: u32 = 0xB358_A6AF;
/// TWL key X word 3 mask.
const TWL_KEYX_ID1_XOR: u32 = 0x08C2_67B7;
/// "NINT"
const TWL_KEYX_WORD1: u32 = 0x544E_494E;
/// "ENDO"
const TWL_KEYX_WORD2: u32 = 0x4F44_4E45;
/// Fixed last word of the TWL key Y.
const TWL_KEYY_WORD3: u32 = 0xE1A0_0005;

/// Bootstrap state of the decrypted NAND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptState {
    Uninit,
    Ready,
    /// Bootstrap failed; no automatic retry.
    Failed,
}

/// Counter family of one group of partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Domain {
    seed: [u32; 4],
    counter_params: AesParams,
    crypt_params: AesParams,
}

impl Domain {
    const fn twl() -> Self {
        Self {
            seed: [0; 4],
            counter_params: AesParams::LITTLE_REVERSED,
            crypt_params: AesParams::LITTLE_REVERSED,
        }
    }

    const fn ctr() -> Self {
        Self {
            seed: [0; 4],
            counter_params: AesParams::INPUT_NORMAL,
            crypt_params: AesParams::BIG_NORMAL,
        }
    }

    fn ctx_at(&self, engine: &AesEngine, sector: u32) -> AesCtx {
        let mut ctx = AesCtx::new(self.crypt_params);
        engine.set_ctr_iv_nonce(
            &mut ctx,
            &self.seed,
            self.counter_params,
            u64::from(sector) << SECTOR_SHIFT,
        );
        ctx
    }
}

/// First 16 digest bytes as the words a little-endian CPU would see.
fn seed_words(digest: &[u8; 32]) -> [u32; 4] {
    core::array::from_fn(|i| {
        u32::from_le_bytes([
            digest[i * 4],
            digest[i * 4 + 1],
            digest[i * 4 + 2],
            digest[i * 4 + 3],
        ])
    })
}

/// Everything the decrypted NAND keeps between requests.
#[derive(Debug)]
pub struct NandCrypto {
    state: CryptState,
    table: PartitionTable,
    ctr_nand_sector: Option<u32>,
    twl: Domain,
    ctr: Domain,
    engine: AesEngine,
    identity: ConsoleIdentity,
    scratch_size: usize,
}

impl NandCrypto {
    pub(crate) fn new(identity: ConsoleIdentity, scratch_size: usize) -> Self {
        Self {
            state: CryptState::Uninit,
            table: PartitionTable::new(),
            ctr_nand_sector: None,
            twl: Domain::twl(),
            ctr: Domain::ctr(),
            engine: AesEngine::new(),
            identity,
            scratch_size,
        }
    }

    pub fn state(&self) -> CryptState {
        self.state
    }

    /// Partition table built by the last successful bootstrap.
    pub fn partitions(&self) -> &PartitionTable {
        &self.table
    }

    /// Start sector of CTR-NAND, once bootstrapped.
    pub fn ctr_nand_sector(&self) -> Option<u32> {
        self.ctr_nand_sector
    }

    pub fn engine(&self) -> &AesEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AesEngine {
        &mut self.engine
    }

    /// Counter a request at `sector` in the domain of `keyslot` starts from.
    pub fn counter_at(&self, keyslot: u8, sector: u32) -> u128 {
        self.domain_for(keyslot).ctx_at(&self.engine, sector).counter()
    }

    pub(crate) fn invalidate(&mut self) {
        self.state = CryptState::Uninit;
        self.table.clear();
        self.ctr_nand_sector = None;
    }

    fn domain_for(&self, keyslot: u8) -> Domain {
        if keyslot == KEYSLOT_TWL_NAND {
            self.twl
        } else {
            self.ctr
        }
    }

    fn derive_counters(&mut self) -> Result<()> {
        let cid = self.identity.nand_cid;
        let twl = sha(
            &cid,
            ShaMode::Sha1,
            ShaParams::new(WordOrder::Big, WordOrder::Big),
        )?;
        let ctr = sha(
            &cid,
            ShaMode::Sha256,
            ShaParams::new(WordOrder::Big, WordOrder::Little),
        )?;
        self.twl.seed = seed_words(&twl);
        self.ctr.seed = seed_words(&ctr);
        trace!("dnand: twl seed {:08X?}", self.twl.seed);
        trace!("dnand: ctr seed {:08X?}", self.ctr.seed);
        Ok(())
    }

    fn program_twl_keys(&mut self) -> Result<()> {
        let [id0, id1] = self.identity.twl_console_id;
        let key_x = [
            (id0 ^ TWL_KEYX_ID0_XOR) | 0x8000_0000,
            TWL_KEYX_WORD1,
            TWL_KEYX_WORD2,
            id1 ^ TWL_KEYX_ID1_XOR,
        ];
        let [y0, y1, y2] = self.identity.twl_key_y;
        let key_y = [y0, y1, y2, TWL_KEYY_WORD3];

        let params = AesParams::LITTLE_REVERSED;
        self.engine
            .set_key(params, KEYSLOT_TWL_NAND, KeyType::X, &key_x, false)?;
        self.engine
            .set_key(params, KEYSLOT_TWL_NAND, KeyType::Y, &key_y, true)?;
        Ok(())
    }

    /// Keyslot of the partition covering `[sector, sector + count)`.
    fn keyslot_for(&self, sector: u32, count: u32) -> Result<u8> {
        if sector.checked_add(count).is_none() {
            return Err(Error::InvalidRange);
        }
        let Some(p) = self.table.find(sector, count).and_then(|i| self.table.get(i)) else {
            warn!("dnand: no partition covers {sector:#x}+{count}");
            return Err(Error::NotFound);
        };
        if !p.has_keyslot() {
            warn!("dnand: partition {:?} has no keyslot", p.name.as_str());
            return Err(Error::InvalidKeyslot(p.keyslot));
        }
        if !self.engine.has_key(p.keyslot) {
            warn!("dnand: keyslot 0x{:02X} is not provisioned", p.keyslot);
            return Err(Error::MissingKey(p.keyslot));
        }
        Ok(p.keyslot)
    }
}

/// The `dnand` identity.
#[derive(Debug)]
pub struct DecryptedNand<'a, B>(&'a mut Sdmmc<B>);

impl<'a, B: SdmmcBus> DecryptedNand<'a, B> {
    pub(crate) fn new(sdmmc: &'a mut Sdmmc<B>) -> Self {
        Self(sdmmc)
    }

    fn bootstrap(&mut self) -> Result<()> {
        self.0.init_raw_nand()?;

        let mut sector = [0u8; SECTOR_SIZE];
        self.0.bus.read_nand(0, 1, &mut sector)?;
        let header = Ncsd::from_sector(&sector)?;
        debug!(
            "dnand: ncsd image size {:#x} sectors, media id {:#x}",
            header.image_size, header.media_id
        );

        let crypt = &mut self.0.crypt;
        let (table, ctr_nand_sector) =
            PartitionTable::from_ncsd(&header, crypt.identity.new_hardware)?;
        crypt.derive_counters()?;
        crypt.program_twl_keys()?;

        crypt.table = table;
        crypt.ctr_nand_sector = ctr_nand_sector;
        crypt.state = CryptState::Ready;
        Ok(())
    }

    fn ensure_ready(&mut self) -> Result<()> {
        match self.0.crypt.state {
            CryptState::Ready => Ok(()),
            CryptState::Uninit => self.init(),
            CryptState::Failed => Err(Error::NotReady),
        }
    }
}

impl<B: SdmmcBus> BlockDevice for DecryptedNand<'_, B> {
    fn name(&self) -> &'static str {
        "dnand"
    }

    fn is_initialized(&self) -> bool {
        self.0.crypt.state == CryptState::Ready
    }

    fn init(&mut self) -> Result<()> {
        if self.0.crypt.state == CryptState::Ready {
            return Ok(());
        }
        match self.bootstrap() {
            Ok(()) => {
                info!("dnand: ready");
                Ok(())
            }
            Err(e) => {
                warn!("dnand: bootstrap failed: {e}");
                let crypt = &mut self.0.crypt;
                crypt.invalidate();
                crypt.state = CryptState::Failed;
                Err(e)
            }
        }
    }

    fn read_sectors(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<()> {
        let len = transfer_len(count, buf.len())?;
        self.ensure_ready()?;

        let Sdmmc { bus, crypt, .. } = &mut *self.0;
        let keyslot = crypt.keyslot_for(sector, count)?;
        crypt.engine.select_keyslot(keyslot)?;
        let mut ctx = crypt.domain_for(keyslot).ctx_at(&crypt.engine, sector);

        let buf = &mut buf[..len];
        if let Err(e) = bus.read_nand(sector, count, buf) {
            warn!("dnand: raw read at {sector:#x}+{count} failed: {e}");
            return Err(e);
        }
        crypt.engine.crypt_in_place(&mut ctx, buf)
    }

    fn write_sectors(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<()> {
        let len = transfer_len(count, buf.len())?;
        self.ensure_ready()?;

        let Sdmmc { bus, crypt, .. } = &mut *self.0;
        let keyslot = crypt.keyslot_for(sector, count)?;
        if keyslot == KEYSLOT_TWL_NAND {
            warn!("dnand: refusing write to twl nand at {sector:#x}");
            return Err(Error::Unsupported("write to twl nand"));
        }

        let chunk_len = len.min(crypt.scratch_size);
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(chunk_len)
            .map_err(|_| Error::OutOfMemory)?;
        scratch.resize(chunk_len, 0);

        crypt.engine.select_keyslot(keyslot)?;
        let mut cur = sector;
        for src in buf[..len].chunks(chunk_len) {
            let n = (src.len() / SECTOR_SIZE) as u32;
            let dst = &mut scratch[..src.len()];
            let mut ctx = crypt.ctr.ctx_at(&crypt.engine, cur);
            crypt.engine.crypt(&mut ctx, src, dst)?;
            if let Err(e) = bus.write_nand(cur, n, dst) {
                warn!(
                    "dnand: raw write at {cur:#x}+{n} failed, {} of {count} sectors written: {e}",
                    cur - sector
                );
                return Err(e);
            }
            cur += n;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.0.crypt.invalidate();
    }

    fn is_active(&mut self) -> bool {
        self.0.nand_ready
    }

    fn sector_count(&self) -> Result<u32> {
        if self.0.crypt.state != CryptState::Ready {
            return Err(Error::NotReady);
        }
        Ok(self.0.bus.nand_sector_count())
    }
}
