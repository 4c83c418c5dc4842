//! Reader representation for PC/SC devices

use pcsc::{ReaderState, State};

/// Marker contactless readers carry in their name
pub const CONTACTLESS_MARKER: &str = "-CL";

/// Representation of a PC/SC card reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscReader {
    /// Name of the reader
    name: String,

    /// Whether a card is present
    has_card: bool,

    /// Answer To Reset of the card (if present)
    atr: Option<Vec<u8>>,
}

impl PcscReader {
    /// Create a new reader
    pub const fn new(name: String, has_card: bool, atr: Option<Vec<u8>>) -> Self {
        Self {
            name,
            has_card,
            atr,
        }
    }

    /// Get the reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if a card is present in the reader
    pub const fn has_card(&self) -> bool {
        self.has_card
    }

    /// Get the ATR of the card if present
    pub fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    /// Whether the reader name marks it as the contactless interface
    pub fn is_contactless(&self) -> bool {
        self.name.contains(CONTACTLESS_MARKER)
    }

    /// Create a reader from a reader state
    pub(crate) fn from_reader_state(reader_state: &ReaderState) -> Self {
        let has_card = card_present(reader_state.event_state());

        Self {
            name: reader_state.name().to_string_lossy().into_owned(),
            has_card,
            atr: has_card.then(|| reader_state.atr().to_vec()),
        }
    }
}

/// Whether a PC/SC event state reports a card in the field
pub(crate) const fn card_present(state: State) -> bool {
    state.contains(State::PRESENT) && !state.contains(State::EMPTY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_present() {
        assert!(card_present(State::PRESENT | State::CHANGED));
        assert!(!card_present(State::EMPTY));
        assert!(!card_present(State::UNAWARE));
    }

    #[test]
    fn test_contactless() {
        let reader = PcscReader::new("OMNIKEY 5427 CK-CL 0".into(), false, None);
        assert!(reader.is_contactless());
        assert!(reader.atr().is_none());

        let reader = PcscReader::new("Gemalto USB 00 00".into(), true, Some(vec![0x3B, 0x00]));
        assert!(!reader.is_contactless());
        assert_eq!(reader.atr(), Some(&[0x3B, 0x00][..]));
    }
}
