//! Error types for PC/SC transport

use mifare_apdu_core::TransportError;

/// Result type for PC/SC operations
pub type Result<T, E = PcscError> = std::result::Result<T, E>;

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// Several readers are attached and none could be picked automatically
    #[error("Multiple readers found, specify one of: {}", .0.join(", "))]
    AmbiguousReader(Vec<String>),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),

    /// The reader monitor is not running
    #[error("Reader monitor stopped")]
    MonitorStopped,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl PcscError {
    /// Create an error from a message
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::Pcsc(pcsc::Error::Timeout) => Self::Timeout,
            PcscError::Pcsc(pcsc::Error::Cancelled) => Self::Cancelled,
            PcscError::Pcsc(pcsc::Error::InsufficientBuffer) => Self::BufferTooSmall,
            PcscError::Pcsc(
                pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard | pcsc::Error::ResetCard,
            )
            | PcscError::NoCard(_) => Self::Connection,
            PcscError::Pcsc(e) => Self::driver(e as i32),
            other => Self::other(other.to_string()),
        }
    }
}

impl From<PcscError> for mifare_apdu_core::Error {
    fn from(error: PcscError) -> Self {
        Self::Transport(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_mapping() {
        assert!(matches!(
            TransportError::from(PcscError::Pcsc(pcsc::Error::RemovedCard)),
            TransportError::Connection
        ));
        assert!(matches!(
            TransportError::from(PcscError::NoCard("ACR122U".into())),
            TransportError::Connection
        ));
        assert!(matches!(
            TransportError::from(PcscError::MonitorStopped),
            TransportError::Other(_)
        ));
    }

    #[test]
    fn test_ambiguous_message() {
        let err = PcscError::AmbiguousReader(vec!["A 0".into(), "B 0".into()]);
        assert_eq!(err.to_string(), "Multiple readers found, specify one of: A 0, B 0");
    }
}
