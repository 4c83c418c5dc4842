//! MIFARE Application Directory collaborators
//!
//! The directory tables themselves (MAD in sector 0, MAD2 in sector 16) are
//! parsed by an external [`DirectoryProvider`]. The card only fetches the raw
//! blocks and routes application lookups to whatever the provider built.

use std::fmt;

use crate::Result;
use crate::constants::BLOCK_SIZE;

/// Which directory to search when reserving a sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplicationMad {
    /// MAD, then MAD2
    #[default]
    Any,
    /// MAD only
    Mad,
    /// MAD2 only
    Mad2,
}

impl ApplicationMad {
    pub(crate) const fn includes_v1(self) -> bool {
        matches!(self, Self::Any | Self::Mad)
    }

    pub(crate) const fn includes_v2(self) -> bool {
        matches!(self, Self::Any | Self::Mad2)
    }
}

/// A loaded application directory
pub trait ApplicationDirectory: Send + fmt::Debug {
    /// Sectors assigned to `app_id`
    fn lookup_sectors(&self, app_id: u16) -> Vec<u8>;

    /// Reserve a free sector for `app_id`, `None` when the directory is full
    fn allocate_sector(&mut self, app_id: u16) -> Option<u8>;
}

/// Builds directories from raw card blocks
pub trait DirectoryProvider: Send + fmt::Debug {
    /// MAD from sector 0 blocks 1 and 2
    fn load_v1(&self, blocks: [[u8; BLOCK_SIZE]; 2]) -> Result<Box<dyn ApplicationDirectory>>;

    /// MAD2 from sector 16 blocks 0, 1 and 2
    fn load_v2(&self, blocks: [[u8; BLOCK_SIZE]; 3]) -> Result<Box<dyn ApplicationDirectory>>;
}
