//! PC/SC transport implementation

use std::{ffi::CString, fmt};

use mifare_apdu_core::prelude::*;
use pcsc::{Attribute, Card, Context, Disposition, MAX_BUFFER_SIZE};
use tracing::{debug, instrument, warn};

use crate::{config::PcscConfig, error::PcscError};

/// Transport implementation using PC/SC
///
/// Owns the card handle; dropping the transport disconnects with the
/// configured [`Disposition`].
pub struct PcscTransport {
    /// PC/SC context
    context: Context,
    /// Card connection, if established
    card: Option<Card>,
    /// Reader name
    reader_name: String,
    /// ATR captured when the connection was established
    atr: Option<Bytes>,
    /// Configuration
    config: PcscConfig,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl PcscTransport {
    /// Connect to the card in the given reader
    ///
    /// Fails with [`PcscError::NoCard`] when the reader is empty.
    pub fn connect(
        context: Context,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<Self, PcscError> {
        let mut transport = Self {
            context,
            card: None,
            reader_name: reader_name.to_string(),
            atr: None,
            config,
        };
        transport.connect_card()?;
        Ok(transport)
    }

    /// Try to connect to the card
    fn connect_card(&mut self) -> Result<(), PcscError> {
        if self.card.is_some() {
            return Ok(());
        }

        let reader_cstr = CString::new(self.reader_name.as_str())
            .map_err(|_| PcscError::ReaderNotFound(self.reader_name.clone()))?;

        match self.context.connect(
            &reader_cstr,
            self.config.share_mode.into(),
            self.config.protocols,
        ) {
            Ok(card) => {
                self.atr = card
                    .get_attribute_owned(Attribute::AtrString)
                    .ok()
                    .map(Bytes::from);
                debug!(reader = %self.reader_name, "Connected to card");
                self.card = Some(card);
                Ok(())
            }
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                Err(PcscError::NoCard(self.reader_name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get the reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// Check if the transport holds a card handle
    pub const fn has_card(&self) -> bool {
        self.card.is_some()
    }

    /// Transmit a command to the card, reconnecting once after a reset
    fn transmit_command(&mut self, command: &[u8]) -> Result<Bytes, PcscError> {
        self.connect_card()?;

        let Some(card) = self.card.as_mut() else {
            return Err(PcscError::NoCard(self.reader_name.clone()));
        };

        let mut response_buffer = [0u8; MAX_BUFFER_SIZE];
        match card.transmit(command, &mut response_buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(pcsc::Error::ResetCard) if self.config.auto_reconnect => {
                warn!(reader = %self.reader_name, "Card was reset, reconnecting");
                card.reconnect(
                    self.config.share_mode.into(),
                    self.config.protocols,
                    Disposition::LeaveCard,
                )?;
                let mut retry_buffer = [0u8; MAX_BUFFER_SIZE];
                let response = card.transmit(command, &mut retry_buffer)?;
                Ok(Bytes::copy_from_slice(response))
            }
            Err(e) => {
                if matches!(e, pcsc::Error::RemovedCard) {
                    self.card = None;
                    self.atr = None;
                }
                Err(e.into())
            }
        }
    }
}

impl CardTransport for PcscTransport {
    type Error = PcscError;

    #[instrument(level = "trace", skip_all, fields(reader = %self.reader_name))]
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        self.transmit_command(command)
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }

    fn atr(&self) -> Option<Bytes> {
        self.atr.clone()
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        match self.card.as_mut() {
            Some(card) => card
                .reconnect(
                    self.config.share_mode.into(),
                    self.config.protocols,
                    Disposition::ResetCard,
                )
                .map_err(Into::into),
            None => self.connect_card(),
        }
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, e)) = card.disconnect(self.config.disposition) {
                debug!(reader = %self.reader_name, error = %e, "Disconnect failed");
            }
        }
    }
}
