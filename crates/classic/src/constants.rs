/// Number of sectors on a MIFARE Classic 4K card
pub const MAX_SECTORS: u8 = 40;

/// Sectors below this index have 4 blocks, the rest have 16
pub const SMALL_SECTOR_COUNT: u8 = 32;

/// Blocks in sectors 0-31
pub const SMALL_SECTOR_BLOCKS: u8 = 4;

/// Blocks in sectors 32-39
pub const LARGE_SECTOR_BLOCKS: u8 = 16;

/// Bytes per block
pub const BLOCK_SIZE: usize = 16;

/// Key length for both Key A and Key B
pub const KEY_LENGTH: usize = 6;

/// Key every blank card ships with
pub const FACTORY_KEY: [u8; KEY_LENGTH] = [0xFF; KEY_LENGTH];

/// Access bytes (6..=9) of a factory trailer
pub const FACTORY_ACCESS_BITS: [u8; 4] = [0xFF, 0x07, 0x80, 0x69];

/// ATR of a MIFARE DESFire card
pub const DESFIRE_ATR: &[u8] = &[0x3B, 0x81, 0x80, 0x01, 0x80, 0x80];

/// Registered application provider identifier of the PC/SC workgroup
pub const PCSC_RID: &[u8] = &[0xA0, 0x00, 0x00, 0x03, 0x06];

/// Trailer layout
pub mod trailer {
    /// Key A occupies bytes 0..6
    pub const KEY_A: core::ops::Range<usize> = 0..6;
    /// Access bits occupy bytes 6..10
    pub const ACCESS_BITS: core::ops::Range<usize> = 6..10;
    /// Key B occupies bytes 10..16
    pub const KEY_B: core::ops::Range<usize> = 10..16;
}
