//! Core error type for all APDU operations
//!
//! Transport, response and command errors are consolidated here so that card
//! applications built on this crate can bubble them up with a single `?`.

use crate::response::error::{ResponseError, StatusError};
use crate::transport::TransportError;

/// Result type for APDU operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error raised by the card transport
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed response frame
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Response carried a failing status word
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Invalid command length
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),
}
