//! MIFARE Classic card application

use bytes::Bytes;
use mifare_apdu_core::CardTransport;
use tracing::debug;

use crate::access::MadVersion;
use crate::atr::{Atr, CardIdentity};
use crate::block::{blocks_in_sector, sector_to_block};
use crate::config::ClassicConfig;
use crate::constants::{BLOCK_SIZE, MAX_SECTORS};
use crate::directory::{ApplicationDirectory, ApplicationMad, DirectoryProvider};
use crate::keys::{KeyRole, KeyStore, SectorKeySet};
use crate::reader::ClassicReader;
use crate::sector::{Sector, SectorHandle};
use crate::{Error, Result};

/// Sector holding MAD2
const MAD2_SECTOR: u8 = 16;

/// A connected MIFARE Classic card
///
/// Sectors are created on first use and cache every block they read. Writes
/// are staged in the cache and only reach the card on [`flush`](Self::flush).
/// Calls take `&mut self`; share a card between threads behind a mutex.
#[derive(Debug)]
pub struct MifareCard<T: CardTransport> {
    reader: ClassicReader<T>,
    sectors: Vec<Option<Sector>>,
    directory_provider: Option<Box<dyn DirectoryProvider>>,
    mad: Option<Box<dyn ApplicationDirectory>>,
    mad2: Option<Box<dyn ApplicationDirectory>>,
    card_info: Option<CardIdentity>,
}

impl<T: CardTransport> MifareCard<T> {
    /// Create a card with the factory key registered as Key A of every sector
    pub fn new(transport: T) -> Self {
        Self::with_config(
            transport,
            KeyStore::with_factory_defaults(),
            ClassicConfig::default(),
        )
    }

    /// Create a card with caller supplied keys
    ///
    /// Fails if any key set is invalid.
    pub fn with_keys<I>(transport: T, key_sets: I) -> Result<Self>
    where
        I: IntoIterator<Item = SectorKeySet>,
    {
        let keys = KeyStore::from_key_sets(key_sets)?;
        Ok(Self::with_config(transport, keys, ClassicConfig::default()))
    }

    /// Create a card with an explicit key store and configuration
    pub fn with_config(transport: T, keys: KeyStore, config: ClassicConfig) -> Self {
        Self {
            reader: ClassicReader::new(transport, keys, config),
            sectors: vec![None; MAX_SECTORS as usize],
            directory_provider: None,
            mad: None,
            mad2: None,
            card_info: None,
        }
    }

    /// Attach the provider used to parse application directories
    pub fn with_directory_provider(mut self, provider: impl DirectoryProvider + 'static) -> Self {
        self.directory_provider = Some(Box::new(provider));
        self
    }

    /// Block-level reader
    pub const fn reader(&self) -> &ClassicReader<T> {
        &self.reader
    }

    /// Mutable block-level reader
    pub const fn reader_mut(&mut self) -> &mut ClassicReader<T> {
        &mut self.reader
    }

    /// Take ownership of the transport and return it
    pub fn into_transport(self) -> T {
        self.reader.into_transport()
    }

    /// Sector `index`, created on demand without any I/O
    pub fn sector(&mut self, index: u8) -> Result<SectorHandle<'_, T>> {
        let slot = self
            .sectors
            .get_mut(index as usize)
            .ok_or(Error::InvalidSector(index))?;
        Ok(SectorHandle {
            sector: slot.get_or_insert_with(|| Sector::new(index)),
            reader: &mut self.reader,
        })
    }

    /// Register or replace a key
    pub fn add_or_update_key_set(&mut self, key_set: SectorKeySet) -> Result<()> {
        self.reader.keys_mut().insert(&key_set)
    }

    /// Try an explicit key on a sector without registering it
    pub fn test_login(&mut self, sector: u8, role: KeyRole, key: &[u8]) -> Result<bool> {
        self.reader.test_login(sector, role, key)
    }

    /// Card UID
    pub fn get_uid(&mut self) -> Result<Bytes> {
        self.reader.get_uid()
    }

    /// Parsed ATR of the card, `None` when the transport has no ATR
    pub fn atr(&self) -> Result<Option<Atr>> {
        match self.reader.atr() {
            Some(raw) => Ok(Some(Atr::parse(&raw)?)),
            None => Ok(None),
        }
    }

    /// Card identity from the ATR, `Unknown` when the transport has no ATR
    pub fn card_info(&mut self) -> CardIdentity {
        if let Some(info) = self.card_info {
            return info;
        }
        let info = self
            .reader
            .atr()
            .map(|atr| CardIdentity::from_atr(&atr))
            .unwrap_or_default();
        self.card_info = Some(info);
        info
    }

    /// Read `length` bytes starting at `(sector, block)`
    ///
    /// Walks every block of each sector in turn, so a trailer crossed on the
    /// way contributes its bytes as read from the card.
    pub fn get_data(&mut self, sector: u8, block: u8, length: usize) -> Result<Vec<u8>> {
        sector_to_block(sector, block)?;

        let mut result = vec![0u8; length];
        let (mut sector, mut block) = (sector, block);
        for chunk in result.chunks_mut(BLOCK_SIZE) {
            let data = self.sector(sector)?.get_data(block)?;
            chunk.copy_from_slice(&data[..chunk.len()]);
            (sector, block) = next_block(sector, block);
        }
        Ok(result)
    }

    /// Stage `data` starting at `(sector, block)`
    ///
    /// Advances through blocks the same way as [`get_data`](Self::get_data).
    /// A chunk that lands on a trailer is not written; the last block is
    /// zero padded. Nothing is written until [`flush`](Self::flush).
    pub fn set_data(&mut self, sector: u8, block: u8, data: &[u8]) -> Result<()> {
        sector_to_block(sector, block)?;

        let (mut sector, mut block) = (sector, block);
        for chunk in data.chunks(BLOCK_SIZE) {
            if block == blocks_in_sector(sector) - 1 {
                debug!(sector, skipped = chunk.len(), "Trailer position left untouched");
            } else {
                let mut padded = [0u8; BLOCK_SIZE];
                padded[..chunk.len()].copy_from_slice(chunk);
                self.sector(sector)?.set_data(block, &padded)?;
            }
            (sector, block) = next_block(sector, block);
        }
        Ok(())
    }

    /// Write every staged change to the card, then drop all caches
    pub fn flush(&mut self) -> Result<()> {
        for sector in self.sectors.iter_mut().flatten() {
            sector.flush(&mut self.reader)?;
        }
        self.reset();
        Ok(())
    }

    /// Drop all caches without writing anything
    pub fn abort(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.sectors.iter_mut().for_each(|s| *s = None);
        self.mad = None;
        self.mad2 = None;
        self.card_info = None;
        self.reader.invalidate_session();
        debug!("Card caches reset");
    }

    /// Sectors assigned to `app_id` in MAD, then MAD2
    pub fn get_app_sectors(&mut self, app_id: u16) -> Result<Vec<u8>> {
        let mut sectors = Vec::new();

        self.init_mad()?;
        if let Some(mad) = &self.mad {
            sectors.extend(mad.lookup_sectors(app_id));
        }

        self.init_mad2()?;
        if let Some(mad2) = &self.mad2 {
            sectors.extend(mad2.lookup_sectors(app_id));
        }

        Ok(sectors)
    }

    /// Reserve a sector for `app_id` in the selected directories
    pub fn add_app_id(&mut self, app_id: u16, which: ApplicationMad) -> Result<Option<u8>> {
        if which.includes_v1() {
            self.init_mad()?;
            if let Some(sector) = self.mad.as_mut().and_then(|m| m.allocate_sector(app_id)) {
                return Ok(Some(sector));
            }
        }

        if which.includes_v2() {
            self.init_mad2()?;
            if let Some(sector) = self.mad2.as_mut().and_then(|m| m.allocate_sector(app_id)) {
                return Ok(Some(sector));
            }
        }

        Ok(None)
    }

    fn init_mad(&mut self) -> Result<()> {
        if self.mad.is_some() || self.directory_provider.is_none() {
            return Ok(());
        }

        let mut sector0 = self.sector(0)?;
        if sector0.access()?.mad_version == MadVersion::NoMad {
            return Ok(());
        }
        let blocks = [sector0.get_data(1)?, sector0.get_data(2)?];

        if let Some(provider) = &self.directory_provider {
            self.mad = Some(provider.load_v1(blocks)?);
            debug!("MAD loaded");
        }
        Ok(())
    }

    fn init_mad2(&mut self) -> Result<()> {
        if self.mad2.is_some() || self.directory_provider.is_none() {
            return Ok(());
        }

        if self.sector(0)?.access()?.mad_version != MadVersion::V2 {
            return Ok(());
        }
        let mut sector16 = self.sector(MAD2_SECTOR)?;
        let blocks = [
            sector16.get_data(0)?,
            sector16.get_data(1)?,
            sector16.get_data(2)?,
        ];

        if let Some(provider) = &self.directory_provider {
            self.mad2 = Some(provider.load_v2(blocks)?);
            debug!("MAD2 loaded");
        }
        Ok(())
    }
}

/// Block after `(sector, block)`, moving to the next sector past its last block
const fn next_block(sector: u8, block: u8) -> (u8, u8) {
    if block + 1 >= blocks_in_sector(sector) {
        (sector + 1, 0)
    } else {
        (sector, block + 1)
    }
}
