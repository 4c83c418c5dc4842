//! Card events emitted by the reader monitor

pub mod channel;
pub use channel::*;

pub mod handler;
pub use handler::*;

use bytes::Bytes;

use crate::monitor::ConnectionHandle;

/// Events related to card insertion/removal
#[derive(Debug)]
pub enum CardEvent<C> {
    /// A card entered the reader's field
    Added {
        /// Reader name
        reader: String,
        /// ATR of the inserted card
        atr: Bytes,
        /// Handle to the connection the monitor opened for this card
        connection: ConnectionHandle<C>,
    },
    /// The card left the reader's field
    ///
    /// The connection handed out with the matching [`CardEvent::Added`] has
    /// already been disposed when this is delivered.
    Removed {
        /// Reader name
        reader: String,
    },
}

impl<C> CardEvent<C> {
    /// Name of the reader the event originates from
    pub fn reader(&self) -> &str {
        match self {
            Self::Added { reader, .. } | Self::Removed { reader } => reader,
        }
    }

    /// Whether this is a card insertion
    pub const fn is_added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }
}

impl<C> Clone for CardEvent<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Added {
                reader,
                atr,
                connection,
            } => Self::Added {
                reader: reader.clone(),
                atr: atr.clone(),
                connection: connection.clone(),
            },
            Self::Removed { reader } => Self::Removed {
                reader: reader.clone(),
            },
        }
    }
}
