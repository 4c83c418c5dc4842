//! Key-aware block I/O over a card transport
//!
//! [`ClassicReader`] owns the transport, the key store and the record of which
//! sector the connection is currently authenticated to.

use bytes::Bytes;
use mifare_apdu_core::{CardTransport, Executor};
use tracing::{debug, instrument, trace};

use crate::block::sector_to_block;
use crate::commands::{general_authenticate, get_historical_bytes, get_uid, load_keys, read_binary, update_binary};
use crate::config::ClassicConfig;
use crate::constants::BLOCK_SIZE;
use crate::keys::{KeyRole, KeyStore, LoginKey, MifareKey};
use crate::{Error, Result};

/// Block-level access to a MIFARE Classic card
#[derive(Debug)]
pub struct ClassicReader<T: CardTransport> {
    transport: T,
    keys: KeyStore,
    config: ClassicConfig,
    /// Sector and role the connection is authenticated with
    session: Option<(u8, KeyRole)>,
}

impl<T: CardTransport> ClassicReader<T> {
    /// Create a reader over a transport
    pub const fn new(transport: T, keys: KeyStore, config: ClassicConfig) -> Self {
        Self {
            transport,
            keys,
            config,
            session: None,
        }
    }

    /// Get a reference to the underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Take ownership of the transport and return it
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Registered keys
    pub const fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Mutable access to the registered keys
    pub const fn keys_mut(&mut self) -> &mut KeyStore {
        &mut self.keys
    }

    /// Active configuration
    pub const fn config(&self) -> &ClassicConfig {
        &self.config
    }

    /// Sector and role the connection is currently authenticated with
    pub const fn session(&self) -> Option<(u8, KeyRole)> {
        self.session
    }

    /// Whether the connection is authenticated to `sector`
    pub fn is_authenticated_to(&self, sector: u8) -> bool {
        matches!(self.session, Some((s, _)) if s == sector)
    }

    /// Forget the authentication state
    pub fn invalidate_session(&mut self) {
        if self.session.take().is_some() {
            debug!("Authentication cache invalidated");
        }
    }

    /// Authenticate to `sector` with a registered key
    ///
    /// Returns `false` without any I/O when no key is registered for the
    /// requested role. Transport errors propagate.
    #[instrument(level = "debug", skip(self))]
    pub fn login(&mut self, sector: u8, key: LoginKey) -> Result<bool> {
        let block = sector_to_block(sector, 0)?;

        let Some((role, key_bytes)) = self.keys.resolve(sector, key) else {
            debug!("No key registered");
            return Ok(false);
        };

        let authenticated = self.authenticate(block, role, &key_bytes)?;
        self.session = authenticated.then_some((sector, role));
        debug!(authenticated, %role, "Login attempt");
        Ok(authenticated)
    }

    /// Try an explicit key without touching the key store
    #[instrument(level = "debug", skip(self, key))]
    pub fn test_login(&mut self, sector: u8, role: KeyRole, key: &[u8]) -> Result<bool> {
        let key = MifareKey::from_slice(key)?;
        let block = sector_to_block(sector, 0)?;

        // whatever the outcome, the registered-key session is gone
        self.invalidate_session();
        self.authenticate(block, role, &key)
    }

    fn authenticate(&mut self, block: u16, role: KeyRole, key: &MifareKey) -> Result<bool> {
        let slot = self.config.key_slot;

        let loaded = self
            .transport
            .execute(&load_keys(self.config.key_structure, slot, key))?;
        if !loaded.is_success() {
            debug!(status = %loaded.status(), "Reader rejected key");
            return Ok(false);
        }

        let response = self
            .transport
            .execute(&general_authenticate(block, role.key_type(), slot)?)?;
        Ok(response.is_success())
    }

    /// Read one block; the caller must be authenticated to the sector
    pub fn read_block(&mut self, sector: u8, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        let address = sector_to_block(sector, block)?;
        let response = self
            .transport
            .execute(&read_binary(address, BLOCK_SIZE as u8))?;

        if !response.is_success() {
            return Err(Error::Read {
                sector,
                block,
                status: response.status(),
            });
        }

        let data: [u8; BLOCK_SIZE] = response
            .data()
            .try_into()
            .map_err(|_| Error::Protocol("READ BINARY returned a partial block"))?;
        trace!(sector, block, data = %hex::encode(data), "Read block");
        Ok(data)
    }

    /// Write one block; the caller must be authenticated to the sector
    pub fn write_block(&mut self, sector: u8, block: u8, data: &[u8]) -> Result<()> {
        let address = sector_to_block(sector, block)?;
        let response = self.transport.execute(&update_binary(address, data)?)?;

        if !response.is_success() {
            return Err(Error::Write {
                sector,
                block,
                status: response.status(),
            });
        }

        trace!(sector, block, data = %hex::encode(data), "Wrote block");
        Ok(())
    }

    /// Card UID
    pub fn get_uid(&mut self) -> Result<Bytes> {
        Ok(self.transport.execute(&get_uid())?.into_result()?)
    }

    /// Historical bytes reported by the reader
    pub fn get_historical_bytes(&mut self) -> Result<Bytes> {
        Ok(self.transport.execute(&get_historical_bytes())?.into_result()?)
    }

    /// ATR of the connected card, if the transport knows it
    pub fn atr(&self) -> Option<Bytes> {
        self.transport.atr()
    }
}
