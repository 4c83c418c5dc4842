use mifare_apdu_core::Command;

use super::CLA_PCSC;
use crate::keys::MifareKey;

/// LOAD KEYS instruction
pub const INS_LOAD_KEYS: u8 = 0x82;

/// Whether the key belongs to the card or to the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyKind {
    /// Card key
    #[default]
    Card,
    /// Reader key
    Reader,
}

/// How the key travels to the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyTransmission {
    /// Plain transmission
    #[default]
    Plain,
    /// Secured transmission
    Secured,
}

/// Where the reader keeps the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStorage {
    /// Volatile memory
    #[default]
    Volatile,
    /// Non-volatile memory
    NonVolatile,
}

/// P1 of LOAD KEYS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyStructure {
    /// Card or reader key
    pub kind: KeyKind,
    /// Plain or secured transmission
    pub transmission: KeyTransmission,
    /// Volatile or non-volatile storage
    pub storage: KeyStorage,
    /// Reader key number (low nibble)
    pub reader_key: u8,
}

impl KeyStructure {
    /// Plain card key kept in volatile memory
    pub const fn volatile() -> Self {
        Self {
            kind: KeyKind::Card,
            transmission: KeyTransmission::Plain,
            storage: KeyStorage::Volatile,
            reader_key: 0,
        }
    }

    /// Set the storage
    pub const fn with_storage(mut self, storage: KeyStorage) -> Self {
        self.storage = storage;
        self
    }

    /// Encode as the P1 byte
    pub const fn to_byte(&self) -> u8 {
        let kind = match self.kind {
            KeyKind::Card => 0x00,
            KeyKind::Reader => 0x80,
        };
        let transmission = match self.transmission {
            KeyTransmission::Plain => 0x00,
            KeyTransmission::Secured => 0x40,
        };
        let storage = match self.storage {
            KeyStorage::Volatile => 0x00,
            KeyStorage::NonVolatile => 0x20,
        };
        kind | transmission | storage | (self.reader_key & 0x0F)
    }
}

/// LOAD KEYS: `FF 82 P1 slot 06 key`
pub fn load_keys(structure: KeyStructure, slot: u8, key: &MifareKey) -> Command {
    Command::new_with_data(
        CLA_PCSC,
        INS_LOAD_KEYS,
        structure.to_byte(),
        slot,
        key.to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_keys() {
        let cmd = load_keys(KeyStructure::volatile(), 0, &MifareKey::FACTORY);
        assert_eq!(
            cmd.to_bytes().unwrap().as_ref(),
            hex::decode("FF82000006FFFFFFFFFFFF").unwrap()
        );
    }

    #[test]
    fn test_key_structure_bits() {
        let structure = KeyStructure {
            kind: KeyKind::Reader,
            transmission: KeyTransmission::Secured,
            storage: KeyStorage::NonVolatile,
            reader_key: 0x13,
        };
        assert_eq!(structure.to_byte(), 0xE3);

        let cmd = load_keys(
            KeyStructure::volatile().with_storage(KeyStorage::NonVolatile),
            1,
            &MifareKey::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]),
        );
        assert_eq!(
            cmd.to_bytes().unwrap().as_ref(),
            hex::decode("FF82200106A0A1A2A3A4A5").unwrap()
        );
    }
}
