//! Sector keys and the in-memory key store

use std::collections::HashMap;
use std::fmt;

use derive_more::{Deref, Display};

use crate::constants::{FACTORY_KEY, KEY_LENGTH, MAX_SECTORS};
use crate::{Error, Result};

/// Which of the two sector keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum KeyRole {
    /// Key A
    #[display("A")]
    A,
    /// Key B
    #[display("B")]
    B,
}

impl KeyRole {
    /// Key type byte used by GENERAL AUTHENTICATE
    pub const fn key_type(self) -> u8 {
        match self {
            Self::A => 0x60,
            Self::B => 0x61,
        }
    }
}

/// Key selector used when logging in to a sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum LoginKey {
    /// Registered Key A of the sector
    #[display("A")]
    A,
    /// Registered Key B of the sector
    #[display("B")]
    B,
    /// Factory key `FF FF FF FF FF FF` as Key A, never stored
    #[display("default")]
    DefaultFactory,
}

impl LoginKey {
    /// Short name used in error messages
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::DefaultFactory => "default",
        }
    }
}

impl From<KeyRole> for LoginKey {
    fn from(role: KeyRole) -> Self {
        match role {
            KeyRole::A => Self::A,
            KeyRole::B => Self::B,
        }
    }
}

/// A 6 byte MIFARE Classic key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Deref)]
pub struct MifareKey([u8; KEY_LENGTH]);

impl MifareKey {
    /// Factory key
    pub const FACTORY: Self = Self(FACTORY_KEY);

    /// Wrap raw key bytes
    pub const fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Build a key from a slice, rejecting anything but 6 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    /// Key bytes
    pub const fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for MifareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // keys are secrets; only the factory key is shown
        if *self == Self::FACTORY {
            f.write_str("MifareKey(FACTORY)")
        } else {
            f.write_str("MifareKey(..)")
        }
    }
}

impl From<[u8; KEY_LENGTH]> for MifareKey {
    fn from(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for MifareKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_slice(bytes)
    }
}

/// Key for one role of one sector, as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorKeySet {
    /// Sector index (0..=39)
    pub sector: u8,
    /// Key role
    pub role: KeyRole,
    /// Raw key bytes, must be 6 long
    pub key: Vec<u8>,
}

impl SectorKeySet {
    /// Create a new key set
    pub fn new(sector: u8, role: KeyRole, key: impl Into<Vec<u8>>) -> Self {
        Self {
            sector,
            role,
            key: key.into(),
        }
    }

    /// Whether the sector is in range and the key is 6 bytes
    pub fn is_valid(&self) -> bool {
        self.sector < MAX_SECTORS && self.key.len() == KEY_LENGTH
    }

    /// Validate the key set and return its key
    pub fn validate(&self) -> Result<MifareKey> {
        if !self.is_valid() {
            return Err(Error::InvalidKeySet {
                sector: self.sector,
                role: self.role,
            });
        }
        MifareKey::from_slice(&self.key)
    }
}

/// Map from `(sector, role)` to key
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: HashMap<(u8, KeyRole), MifareKey>,
}

impl KeyStore {
    /// Create an empty key store
    pub fn new() -> Self {
        Self::default()
    }

    /// Key store with the factory key registered as Key A of every sector
    pub fn with_factory_defaults() -> Self {
        let mut store = Self::new();
        for sector in 0..MAX_SECTORS {
            store.add_or_update(sector, KeyRole::A, MifareKey::FACTORY);
        }
        store
    }

    /// Build a key store from caller supplied key sets
    ///
    /// Fails on the first invalid key set.
    pub fn from_key_sets<I>(key_sets: I) -> Result<Self>
    where
        I: IntoIterator<Item = SectorKeySet>,
    {
        let mut store = Self::new();
        for key_set in key_sets {
            store.insert(&key_set)?;
        }
        Ok(store)
    }

    /// Add or replace the key for `(sector, role)`
    pub fn add_or_update(&mut self, sector: u8, role: KeyRole, key: MifareKey) {
        self.keys.insert((sector, role), key);
    }

    /// Validate and store a key set
    pub fn insert(&mut self, key_set: &SectorKeySet) -> Result<()> {
        let key = key_set.validate()?;
        self.add_or_update(key_set.sector, key_set.role, key);
        Ok(())
    }

    /// Key registered for `(sector, role)`
    pub fn lookup(&self, sector: u8, role: KeyRole) -> Option<MifareKey> {
        self.keys.get(&(sector, role)).copied()
    }

    /// Resolve a login selector to the role and key to authenticate with
    pub fn resolve(&self, sector: u8, key: LoginKey) -> Option<(KeyRole, MifareKey)> {
        match key {
            LoginKey::DefaultFactory => Some((KeyRole::A, MifareKey::FACTORY)),
            LoginKey::A => self.lookup(sector, KeyRole::A).map(|k| (KeyRole::A, k)),
            LoginKey::B => self.lookup(sector, KeyRole::B).map(|k| (KeyRole::B, k)),
        }
    }

    /// Number of registered keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are registered
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_length_rejected() {
        let short = SectorKeySet::new(1, KeyRole::A, vec![0xFF; 5]);
        assert!(!short.is_valid());
        assert!(matches!(
            short.validate(),
            Err(Error::InvalidKeySet { sector: 1, role: KeyRole::A })
        ));

        let long = SectorKeySet::new(1, KeyRole::B, vec![0xFF; 7]);
        assert!(long.validate().is_err());

        assert!(matches!(
            MifareKey::from_slice(&[0x00; 4]),
            Err(Error::InvalidKeyLength(4))
        ));
    }

    #[test]
    fn test_sector_out_of_range_rejected() {
        let set = SectorKeySet::new(40, KeyRole::A, FACTORY_KEY.to_vec());
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_key_store_from_invalid_list() {
        let sets = vec![
            SectorKeySet::new(0, KeyRole::A, FACTORY_KEY.to_vec()),
            SectorKeySet::new(1, KeyRole::A, vec![0x01, 0x02]),
        ];
        assert!(KeyStore::from_key_sets(sets).is_err());
    }

    #[test]
    fn test_add_or_update_replaces() {
        let mut store = KeyStore::new();
        store.add_or_update(3, KeyRole::B, MifareKey::FACTORY);
        let key = MifareKey::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
        store.add_or_update(3, KeyRole::B, key);

        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(3, KeyRole::B), Some(key));
        assert_eq!(store.lookup(3, KeyRole::A), None);
    }

    #[test]
    fn test_resolve() {
        let key_b = MifareKey::new([0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7]);
        let store =
            KeyStore::from_key_sets([SectorKeySet::new(5, KeyRole::B, key_b.to_vec())]).unwrap();

        assert_eq!(store.resolve(5, LoginKey::A), None);
        assert_eq!(store.resolve(5, LoginKey::B), Some((KeyRole::B, key_b)));
        assert_eq!(
            store.resolve(5, LoginKey::DefaultFactory),
            Some((KeyRole::A, MifareKey::FACTORY))
        );
        assert!(KeyStore::new().resolve(0, LoginKey::DefaultFactory).is_some());
    }

    #[test]
    fn test_factory_defaults() {
        let store = KeyStore::with_factory_defaults();
        assert_eq!(store.len(), MAX_SECTORS as usize);
        assert_eq!(store.lookup(39, KeyRole::A), Some(MifareKey::FACTORY));
        assert_eq!(store.lookup(39, KeyRole::B), None);
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = MifareKey::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(format!("{key:?}"), "MifareKey(..)");
        assert_eq!(format!("{:?}", MifareKey::FACTORY), "MifareKey(FACTORY)");
    }
}
