//! One sector: block cache, access conditions and flushing

use mifare_apdu_core::CardTransport;
use tracing::debug;

use crate::access::AccessConditions;
use crate::block::{DataBlock, blocks_in_sector};
use crate::constants::{BLOCK_SIZE, SMALL_SECTOR_COUNT, trailer};
use crate::keys::{KeyRole, LoginKey, MifareKey};
use crate::reader::ClassicReader;
use crate::{Error, Result};

/// Cached state of one sector
///
/// Blocks are read on first access and kept until the owning card is flushed
/// or aborted. Writes only touch the cache until [`SectorHandle::flush`].
#[derive(Debug, Clone)]
pub struct Sector {
    index: u8,
    blocks: Vec<Option<DataBlock>>,
    /// Live access conditions, may be edited before `flush_trailer`
    access: Option<AccessConditions>,
    /// Access conditions as last read from (or written to) the card
    access_as_read: Option<AccessConditions>,
}

impl Sector {
    pub(crate) fn new(index: u8) -> Self {
        Self {
            index,
            blocks: vec![None; blocks_in_sector(index) as usize],
            access: None,
            access_as_read: None,
        }
    }

    /// Sector index
    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Number of blocks in the sector, trailer included
    pub const fn num_data_blocks(&self) -> u8 {
        blocks_in_sector(self.index)
    }

    /// Index of the trailer block
    pub const fn trailer_block(&self) -> u8 {
        self.num_data_blocks() - 1
    }

    /// Bytes of data, trailer excluded
    pub const fn data_length(&self) -> usize {
        (self.num_data_blocks() as usize - 1) * BLOCK_SIZE
    }

    /// Bytes in the sector, trailer included
    pub const fn total_length(&self) -> usize {
        self.num_data_blocks() as usize * BLOCK_SIZE
    }

    /// Cached block, if it has been read
    pub fn block(&self, block: u8) -> Option<&DataBlock> {
        self.blocks.get(block as usize).and_then(Option::as_ref)
    }

    /// Whether any data block has unflushed changes
    pub fn is_dirty(&self) -> bool {
        self.blocks.iter().flatten().any(|b| b.is_dirty() && !b.is_trailer())
    }

    /// Data area covering `block`: one per block in small sectors, five blocks each in large ones
    const fn area_of(&self, block: u8) -> usize {
        if self.index < SMALL_SECTOR_COUNT {
            block as usize
        } else {
            block as usize / 5
        }
    }

    fn check_block(&self, block: u8) -> Result<()> {
        if block >= self.num_data_blocks() {
            return Err(Error::InvalidBlock {
                sector: self.index,
                block,
            });
        }
        Ok(())
    }

    fn ensure_login<T: CardTransport>(
        &self,
        reader: &mut ClassicReader<T>,
        role: KeyRole,
    ) -> Result<()> {
        if reader.session() == Some((self.index, role)) {
            return Ok(());
        }
        if !reader.login(self.index, role.into())? {
            return Err(Error::Login {
                sector: self.index,
                key: LoginKey::from(role).as_str(),
            });
        }
        Ok(())
    }

    fn load_block<T: CardTransport>(
        &mut self,
        reader: &mut ClassicReader<T>,
        block: u8,
    ) -> Result<&mut DataBlock> {
        self.check_block(block)?;
        let sector = self.index;
        let is_trailer = block == self.trailer_block();

        let slot = &mut self.blocks[block as usize];
        if slot.is_none() {
            if !reader.is_authenticated_to(sector)
                && !reader.login(sector, LoginKey::A)?
                && !reader.login(sector, LoginKey::B)?
            {
                return Err(Error::Login {
                    sector,
                    key: "A or B",
                });
            }

            let data = reader.read_block(sector, block)?;
            debug!(sector, block, "Block loaded");
            *slot = Some(DataBlock::new(block, &data, is_trailer));
        }

        slot.as_mut()
            .ok_or(Error::Protocol("block cache slot empty after load"))
    }

    fn load_access<T: CardTransport>(
        &mut self,
        reader: &mut ClassicReader<T>,
    ) -> Result<&mut AccessConditions> {
        if self.access.is_none() {
            let trailer = *self.load_block(reader, self.trailer_block())?.data();
            let decoded = AccessConditions::decode(&trailer);
            self.access_as_read = Some(decoded);
            self.access = Some(decoded);
        }
        self.access
            .as_mut()
            .ok_or(Error::Protocol("access conditions missing after load"))
    }

    fn write_role_for<T: CardTransport>(
        &mut self,
        reader: &mut ClassicReader<T>,
        block: u8,
    ) -> Result<KeyRole> {
        self.load_access(reader)?;
        let snapshot = self.access_as_read.unwrap_or_default();
        Ok(if block == self.trailer_block() {
            snapshot.trailer_write_role()
        } else {
            snapshot.data_area_write_role(self.area_of(block))
        })
    }

    fn flush_block<T: CardTransport>(
        &mut self,
        reader: &mut ClassicReader<T>,
        block: u8,
    ) -> Result<()> {
        let role = self.write_role_for(reader, block)?;
        self.ensure_login(reader, role)?;

        let data = *self.load_block(reader, block)?.data();
        reader.write_block(self.index, block, &data)?;
        self.load_block(reader, block)?.mark_clean();
        debug!(sector = self.index, block, %role, "Block flushed");
        Ok(())
    }

    pub(crate) fn flush<T: CardTransport>(&mut self, reader: &mut ClassicReader<T>) -> Result<()> {
        let dirty: Vec<u8> = self
            .blocks
            .iter()
            .flatten()
            .filter(|b| b.is_dirty() && !b.is_trailer())
            .map(DataBlock::index)
            .collect();

        for block in dirty {
            self.flush_block(reader, block)?;
        }
        Ok(())
    }
}

/// A sector bound to the reader of its card
///
/// Obtained from [`MifareCard::sector`](crate::MifareCard::sector).
#[derive(Debug)]
pub struct SectorHandle<'a, T: CardTransport> {
    pub(crate) sector: &'a mut Sector,
    pub(crate) reader: &'a mut ClassicReader<T>,
}

impl<T: CardTransport> SectorHandle<'_, T> {
    /// Sector index
    pub fn index(&self) -> u8 {
        self.sector.index()
    }

    /// Number of blocks in the sector, trailer included
    pub fn num_data_blocks(&self) -> u8 {
        self.sector.num_data_blocks()
    }

    /// Bytes of data, trailer excluded
    pub fn data_length(&self) -> usize {
        self.sector.data_length()
    }

    /// Bytes in the sector, trailer included
    pub fn total_length(&self) -> usize {
        self.sector.total_length()
    }

    /// Cached sector state
    pub fn cached(&self) -> &Sector {
        self.sector
    }

    /// Authenticate to this sector
    pub fn login(&mut self, key: LoginKey) -> Result<bool> {
        self.reader.login(self.sector.index, key)
    }

    /// Try an explicit key without registering it
    pub fn test_login(&mut self, role: KeyRole, key: &[u8]) -> Result<bool> {
        self.reader.test_login(self.sector.index, role, key)
    }

    /// Read one block (always 16 bytes), loading it on first access
    ///
    /// Logs in with Key A, then Key B, when the connection is not already
    /// authenticated to this sector.
    pub fn get_data(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        Ok(*self.sector.load_block(self.reader, block)?.data())
    }

    /// Stage `data` into consecutive data blocks starting at `first_block`
    ///
    /// Nothing is written to the card until [`flush`](Self::flush). Data that
    /// runs past the last data block is dropped; the trailer is never touched.
    pub fn set_data(&mut self, first_block: u8, data: &[u8]) -> Result<()> {
        let trailer = self.sector.trailer_block();
        if first_block >= trailer {
            return Err(Error::InvalidBlock {
                sector: self.sector.index,
                block: first_block,
            });
        }

        let mut chunks = data.chunks(BLOCK_SIZE);
        for block in first_block..trailer {
            let Some(chunk) = chunks.next() else {
                break;
            };
            self.sector.load_block(self.reader, block)?.write(chunk);
        }

        let dropped: usize = chunks.map(<[u8]>::len).sum();
        if dropped > 0 {
            debug!(sector = self.sector.index, dropped, "Data runs past the sector");
        }
        Ok(())
    }

    /// Live access conditions, loading the trailer on first access
    pub fn access(&mut self) -> Result<&mut AccessConditions> {
        self.sector.load_access(self.reader)
    }

    /// Key A bytes of the cached trailer
    ///
    /// Cards never reveal Key A, so a freshly read trailer yields zeros.
    pub fn key_a(&mut self) -> Result<MifareKey> {
        let trailer_block = self.sector.trailer_block();
        let data = self.sector.load_block(self.reader, trailer_block)?.data();
        MifareKey::from_slice(&data[trailer::KEY_A])
    }

    /// Key B bytes of the cached trailer
    pub fn key_b(&mut self) -> Result<MifareKey> {
        let trailer_block = self.sector.trailer_block();
        let data = self.sector.load_block(self.reader, trailer_block)?.data();
        MifareKey::from_slice(&data[trailer::KEY_B])
    }

    /// Replace Key A in the cached trailer
    pub fn set_key_a(&mut self, key: &MifareKey) -> Result<()> {
        let trailer_block = self.sector.trailer_block();
        self.sector.load_block(self.reader, trailer_block)?.data_mut()[trailer::KEY_A]
            .copy_from_slice(key.as_bytes());
        Ok(())
    }

    /// Replace Key B in the cached trailer
    pub fn set_key_b(&mut self, key: &MifareKey) -> Result<()> {
        let trailer_block = self.sector.trailer_block();
        self.sector.load_block(self.reader, trailer_block)?.data_mut()[trailer::KEY_B]
            .copy_from_slice(key.as_bytes());
        Ok(())
    }

    /// Write every dirty data block to the card
    ///
    /// Each block is written with the key its data area grants write access
    /// to, as read from the card.
    pub fn flush(&mut self) -> Result<()> {
        self.sector.flush(self.reader)
    }

    /// Rewrite the trailer with new keys and the live access conditions
    ///
    /// The trailer must have been read first. The write uses the key the
    /// previously read conditions grant access-bit write to.
    pub fn flush_trailer(&mut self, key_a: &MifareKey, key_b: &MifareKey) -> Result<()> {
        let index = self.sector.index;
        let trailer_block = self.sector.trailer_block();
        if self.sector.block(trailer_block).is_none() {
            return Err(Error::TrailerNotLoaded(index));
        }

        let bits = self.sector.load_access(self.reader)?.encode();
        let block = self.sector.load_block(self.reader, trailer_block)?;
        let data = block.data_mut();
        data[trailer::KEY_A].copy_from_slice(key_a.as_bytes());
        data[trailer::ACCESS_BITS].copy_from_slice(&bits);
        data[trailer::KEY_B].copy_from_slice(key_b.as_bytes());

        self.sector.flush_block(self.reader, trailer_block)?;

        let written = *self.sector.load_block(self.reader, trailer_block)?.data();
        self.sector.access_as_read = Some(AccessConditions::decode(&written));
        self.reader.invalidate_session();
        debug!(sector = index, "Trailer rewritten");
        Ok(())
    }
}
