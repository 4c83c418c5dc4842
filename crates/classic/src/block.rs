//! Blocks and sector geometry

use crate::constants::{
    BLOCK_SIZE, LARGE_SECTOR_BLOCKS, MAX_SECTORS, SMALL_SECTOR_BLOCKS, SMALL_SECTOR_COUNT,
};
use crate::{Error, Result};

/// Number of blocks in a sector, trailer included
pub(crate) const fn blocks_in_sector(sector: u8) -> u8 {
    if sector < SMALL_SECTOR_COUNT {
        SMALL_SECTOR_BLOCKS
    } else {
        LARGE_SECTOR_BLOCKS
    }
}

/// Absolute block address of `block` within `sector`
///
/// Sectors 0-31 have 4 blocks, sectors 32-39 have 16.
pub fn sector_to_block(sector: u8, block: u8) -> Result<u16> {
    if sector >= MAX_SECTORS {
        return Err(Error::InvalidSector(sector));
    }
    if block >= blocks_in_sector(sector) {
        return Err(Error::InvalidBlock { sector, block });
    }

    let address = if sector < SMALL_SECTOR_COUNT {
        sector as u16 * SMALL_SECTOR_BLOCKS as u16 + block as u16
    } else {
        let large = (sector - SMALL_SECTOR_COUNT) as u16;
        SMALL_SECTOR_COUNT as u16 * SMALL_SECTOR_BLOCKS as u16
            + large * LARGE_SECTOR_BLOCKS as u16
            + block as u16
    };
    Ok(address)
}

/// One cached 16 byte block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    index: u8,
    data: [u8; BLOCK_SIZE],
    is_trailer: bool,
    dirty: bool,
}

impl DataBlock {
    pub(crate) fn new(index: u8, bytes: &[u8], is_trailer: bool) -> Self {
        let mut data = [0u8; BLOCK_SIZE];
        let len = bytes.len().min(BLOCK_SIZE);
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            index,
            data,
            is_trailer,
            dirty: false,
        }
    }

    /// Block index within its sector
    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Block contents
    pub const fn data(&self) -> &[u8; BLOCK_SIZE] {
        &self.data
    }

    /// Whether this is the sector trailer
    pub const fn is_trailer(&self) -> bool {
        self.is_trailer
    }

    /// Whether the block has unflushed changes
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Overwrite `bytes.len()` bytes from the start of the block and mark it dirty
    pub(crate) fn write(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(BLOCK_SIZE);
        self.data[..len].copy_from_slice(&bytes[..len]);
        self.dirty = true;
    }

    pub(crate) const fn data_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        &mut self.data
    }

    pub(crate) const fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_to_block() {
        assert_eq!(sector_to_block(0, 0).unwrap(), 0);
        assert_eq!(sector_to_block(1, 3).unwrap(), 7);
        assert_eq!(sector_to_block(31, 3).unwrap(), 127);
        assert_eq!(sector_to_block(32, 0).unwrap(), 128);
        assert_eq!(sector_to_block(33, 1).unwrap(), 145);
        assert_eq!(sector_to_block(39, 15).unwrap(), 255);

        for sector in 0..MAX_SECTORS {
            for block in 0..blocks_in_sector(sector) {
                let expected = if sector < 32 {
                    sector as u16 * 4 + block as u16
                } else {
                    128 + (sector as u16 - 32) * 16 + block as u16
                };
                assert_eq!(sector_to_block(sector, block).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_sector_to_block_out_of_range() {
        assert!(matches!(sector_to_block(40, 0), Err(Error::InvalidSector(40))));
        assert!(matches!(
            sector_to_block(5, 4),
            Err(Error::InvalidBlock { sector: 5, block: 4 })
        ));
        assert!(matches!(
            sector_to_block(39, 16),
            Err(Error::InvalidBlock { sector: 39, block: 16 })
        ));
        assert!(sector_to_block(32, 15).is_ok());
    }

    #[test]
    fn test_data_block_write() {
        let mut block = DataBlock::new(1, &[0xAA; 16], false);
        assert!(!block.is_dirty());

        block.write(&[0x01, 0x02]);
        assert!(block.is_dirty());
        assert_eq!(&block.data()[..3], &[0x01, 0x02, 0xAA]);

        block.mark_clean();
        assert!(!block.is_dirty());
    }
}
