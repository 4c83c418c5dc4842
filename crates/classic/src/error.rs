use mifare_apdu_core::StatusWord;
use mifare_apdu_core::response::error::StatusError;

use crate::atr::AtrError;
use crate::keys::KeyRole;

/// Result type for MIFARE Classic operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for MIFARE Classic operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// APDU layer errors (transport, framing, command encoding)
    #[error(transparent)]
    Apdu(#[from] mifare_apdu_core::Error),

    /// A command that must succeed returned a failing status word
    #[error(transparent)]
    Status(#[from] StatusError),

    /// No key could authenticate to the sector
    #[error("Unable to login in sector {sector} with key {key}")]
    Login {
        /// Sector index
        sector: u8,
        /// Key (or keys) that were tried
        key: &'static str,
    },

    /// READ BINARY failed
    #[error("Unable to read from sector {sector}, block {block}: {status}")]
    Read {
        /// Sector index
        sector: u8,
        /// Block index within the sector
        block: u8,
        /// Status word returned by the reader
        status: StatusWord,
    },

    /// UPDATE BINARY failed
    #[error("Unable to write in sector {sector}, block {block}: {status}")]
    Write {
        /// Sector index
        sector: u8,
        /// Block index within the sector
        block: u8,
        /// Status word returned by the reader
        status: StatusWord,
    },

    /// Sector index out of range
    #[error("Invalid sector {0}: sector must be between 0 and 39")]
    InvalidSector(u8),

    /// Block index out of range for the sector
    #[error("Invalid block {block} for sector {sector}")]
    InvalidBlock {
        /// Sector index
        sector: u8,
        /// Offending block index
        block: u8,
    },

    /// Key is not 6 bytes long
    #[error("Invalid key length {0}: keys are 6 bytes")]
    InvalidKeyLength(usize),

    /// Key set failed validation
    #[error("KeySet with sector {sector}, key {role} is invalid")]
    InvalidKeySet {
        /// Sector of the rejected key set
        sector: u8,
        /// Role of the rejected key set
        role: KeyRole,
    },

    /// Authentication key type is neither 0x60 nor 0x61
    #[error("Invalid key type {0:#04x}")]
    InvalidKeyType(u8),

    /// Block payload longer than 16 bytes
    #[error("Payload of {0} bytes does not fit a 16 byte block")]
    PayloadTooLong(usize),

    /// The trailer must be read before it can be rewritten
    #[error("Trailer of sector {0} has not been loaded")]
    TrailerNotLoaded(u8),

    /// Malformed ATR
    #[error(transparent)]
    Atr(#[from] AtrError),

    /// Reply did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(&'static str),

    /// Application directory could not be loaded
    #[error("Directory error: {0}")]
    Directory(String),
}

impl Error {
    /// Whether the error is an authentication failure
    pub const fn is_login(&self) -> bool {
        matches!(self, Self::Login { .. })
    }
}

impl From<mifare_apdu_core::transport::TransportError> for Error {
    fn from(error: mifare_apdu_core::transport::TransportError) -> Self {
        Self::Apdu(error.into())
    }
}
