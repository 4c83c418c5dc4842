use crate::commands::{KeyStorage, KeyStructure};

/// Configuration for talking to a MIFARE Classic card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassicConfig {
    /// Reader key slot used for LOAD KEYS and GENERAL AUTHENTICATE
    pub key_slot: u8,
    /// P1 of LOAD KEYS
    pub key_structure: KeyStructure,
}

impl Default for ClassicConfig {
    fn default() -> Self {
        Self {
            key_slot: 0,
            key_structure: KeyStructure::volatile(),
        }
    }
}

impl ClassicConfig {
    /// Set the reader key slot
    pub const fn with_key_slot(mut self, key_slot: u8) -> Self {
        self.key_slot = key_slot;
        self
    }

    /// Set where the reader stores loaded keys
    pub const fn with_key_storage(mut self, storage: KeyStorage) -> Self {
        self.key_structure = self.key_structure.with_storage(storage);
        self
    }

    /// Set the full LOAD KEYS key structure
    pub const fn with_key_structure(mut self, key_structure: KeyStructure) -> Self {
        self.key_structure = key_structure;
        self
    }
}
