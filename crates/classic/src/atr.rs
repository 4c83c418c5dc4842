//! Answer-To-Reset parsing and card identification

use bytes::Bytes;
use derive_more::Display;
use iso7816_tlv::simple::Tlv;
use tracing::{debug, trace};

use crate::constants::{DESFIRE_ATR, PCSC_RID};

const ATR_HEADER: u8 = 0x3B;
const MAX_INTERFACE_ROUNDS: usize = 4;
const CATEGORY_TLV: u8 = 0x80;
const TAG_APPLICATION_IDENTIFIER: u8 = 0x4F;
const APPLICATION_IDENTIFIER_LENGTH: u8 = 0x0C;

/// ATR parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AtrError {
    /// Initial character is not `3B`
    #[error("Invalid ATR header {0:#04x}")]
    InvalidHeader(u8),

    /// ATR ended before all announced bytes were read
    #[error("ATR truncated")]
    Truncated,
}

/// Interface characters of one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceBytes {
    /// TAi
    pub ta: Option<u8>,
    /// TBi
    pub tb: Option<u8>,
    /// TCi
    pub tc: Option<u8>,
    /// TDi
    pub td: Option<u8>,
}

/// Parsed Answer-To-Reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atr {
    /// Interface characters, one entry per round present
    pub interface_bytes: Vec<InterfaceBytes>,
    /// Historical bytes
    pub historical_bytes: Bytes,
    /// Bitmask of advertised protocols (bit `n` is T=n)
    pub protocols: u16,
    /// TCK check result, only present when a protocol other than T=0 is advertised
    pub tck_valid: Option<bool>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn byte(&mut self) -> Result<u8, AtrError> {
        let b = *self.bytes.get(self.pos).ok_or(AtrError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], AtrError> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + len)
            .ok_or(AtrError::Truncated)?;
        self.pos += len;
        Ok(slice)
    }
}

impl Atr {
    /// Parse ATR bytes
    pub fn parse(atr: &[u8]) -> Result<Self, AtrError> {
        let mut cursor = Cursor::new(atr);

        let header = cursor.byte()?;
        if header != ATR_HEADER {
            return Err(AtrError::InvalidHeader(header));
        }

        let format = cursor.byte()?;
        let mut presence = format & 0xF0;
        let mut interface_bytes = Vec::new();
        let mut protocols = 0u16;

        for _ in 0..MAX_INTERFACE_ROUNDS {
            let mut round = InterfaceBytes::default();
            if presence & 0x10 != 0 {
                round.ta = Some(cursor.byte()?);
            }
            if presence & 0x20 != 0 {
                round.tb = Some(cursor.byte()?);
            }
            if presence & 0x40 != 0 {
                round.tc = Some(cursor.byte()?);
            }
            if presence & 0x80 == 0 {
                if presence & 0x70 != 0 {
                    interface_bytes.push(round);
                }
                break;
            }

            let td = cursor.byte()?;
            round.td = Some(td);
            interface_bytes.push(round);

            presence = td;
            protocols |= 1 << (td & 0x0F);
        }

        let historical_bytes = Bytes::copy_from_slice(cursor.take((format & 0x0F) as usize)?);

        let tck_valid = (protocols & !1 != 0).then(|| atr[1..].iter().fold(0u8, |acc, b| acc ^ b) == 0);

        trace!(
            atr = %hex::encode(atr),
            historical = %hex::encode(&historical_bytes),
            protocols,
            ?tck_valid,
            "Parsed ATR"
        );

        Ok(Self {
            interface_bytes,
            historical_bytes,
            protocols,
            tck_valid,
        })
    }
}

/// Class of the detected card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum DeviceClass {
    /// Not identified
    #[default]
    Unknown,
    /// PC/SC storage card (MIFARE Classic, Ultralight, ...)
    StorageClass,
    /// MIFARE DESFire
    MifareDesfire,
}

/// Card name code from the PC/SC part 3 registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum CardName {
    /// No name
    #[default]
    Unknown,
    /// MIFARE Classic 1K
    MifareStandard1K,
    /// MIFARE Classic 4K
    MifareStandard4K,
    /// MIFARE Ultralight
    MifareUltralight,
    /// MIFARE Mini
    MifareMini,
    /// MIFARE Ultralight C
    MifareUltralightC,
    /// Any other registered code
    #[display("Other({_0:#06x})")]
    Other(u16),
}

impl From<u16> for CardName {
    fn from(code: u16) -> Self {
        match code {
            0x0000 => Self::Unknown,
            0x0001 => Self::MifareStandard1K,
            0x0002 => Self::MifareStandard4K,
            0x0003 => Self::MifareUltralight,
            0x0026 => Self::MifareMini,
            0x003A => Self::MifareUltralightC,
            other => Self::Other(other),
        }
    }
}

/// Result of identifying a card from its ATR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CardIdentity {
    /// Device class
    pub device_class: DeviceClass,
    /// Card name
    pub card_name: CardName,
}

impl CardIdentity {
    /// Identify a card from its ATR
    ///
    /// Never fails: anything that cannot be parsed or recognized is `Unknown`.
    pub fn from_atr(atr: &[u8]) -> Self {
        let parsed = match Atr::parse(atr) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, atr = %hex::encode(atr), "Unparseable ATR");
                return Self::default();
            }
        };

        let historical = &parsed.historical_bytes;
        let identity = match historical.len() {
            0 => Self::default(),
            1 if atr == DESFIRE_ATR => Self {
                device_class: DeviceClass::MifareDesfire,
                card_name: CardName::Unknown,
            },
            1 => Self::default(),
            _ if historical[0] == CATEGORY_TLV => Self::scan_tlv(&historical[1..]),
            _ => Self::default(),
        };

        debug!(
            device_class = %identity.device_class,
            card_name = %identity.card_name,
            "Identified card"
        );
        identity
    }

    fn scan_tlv(mut remaining: &[u8]) -> Self {
        let mut identity = Self::default();

        while !remaining.is_empty() {
            let (parsed, next) = Tlv::parse(remaining);
            let tlv = match parsed {
                Ok(tlv) => tlv,
                Err(e) => {
                    debug!(error = ?e, "Malformed TLV in historical bytes");
                    break;
                }
            };

            let tag: u8 = tlv.tag().into();
            let value = tlv.value();
            if tag == TAG_APPLICATION_IDENTIFIER
                && value.len() == APPLICATION_IDENTIFIER_LENGTH as usize
                && value.starts_with(PCSC_RID)
            {
                // RID (5) | standard (1) | card name (2) | RFU (4)
                identity.card_name = CardName::from(u16::from_be_bytes([value[6], value[7]]));
                identity.device_class = DeviceClass::StorageClass;
            }

            remaining = next;
        }

        identity
    }

    /// Whether this is a MIFARE Classic card
    pub const fn is_mifare_classic(&self) -> bool {
        matches!(
            self.card_name,
            CardName::MifareStandard1K | CardName::MifareStandard4K | CardName::MifareMini
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIC_1K_ATR: &str = "3B8F8001804F0CA000000306030001000000006A";
    const CLASSIC_4K_ATR: &str = "3B8F8001804F0CA0000003060300020000000069";

    #[test]
    fn test_parse_classic_atr() {
        let atr = Atr::parse(&hex::decode(CLASSIC_1K_ATR).unwrap()).unwrap();

        assert_eq!(atr.interface_bytes.len(), 2);
        assert_eq!(atr.interface_bytes[0].td, Some(0x80));
        assert_eq!(atr.interface_bytes[1].td, Some(0x01));
        assert_eq!(atr.historical_bytes.len(), 15);
        assert_eq!(atr.protocols, 0b11);
        assert_eq!(atr.tck_valid, Some(true));
    }

    #[test]
    fn test_bad_tck() {
        let mut raw = hex::decode(CLASSIC_1K_ATR).unwrap();
        *raw.last_mut().unwrap() ^= 0xFF;
        assert_eq!(Atr::parse(&raw).unwrap().tck_valid, Some(false));
    }

    #[test]
    fn test_t0_only_skips_tck() {
        // TS T0(TA1, 2 historical) TA1 H1 H2
        let atr = Atr::parse(&[0x3B, 0x12, 0x96, 0x41, 0x42]).unwrap();
        assert_eq!(atr.interface_bytes[0].ta, Some(0x96));
        assert_eq!(atr.historical_bytes.as_ref(), &[0x41, 0x42]);
        assert_eq!(atr.tck_valid, None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Atr::parse(&[]), Err(AtrError::Truncated));
        assert_eq!(Atr::parse(&[0x3F, 0x00]), Err(AtrError::InvalidHeader(0x3F)));
        assert_eq!(Atr::parse(&[0x3B, 0x8F, 0x80]), Err(AtrError::Truncated));
        assert_eq!(Atr::parse(&[0x3B, 0x03, 0x01]), Err(AtrError::Truncated));
    }

    #[test]
    fn test_identify_storage_card() {
        let identity = CardIdentity::from_atr(&hex::decode(CLASSIC_1K_ATR).unwrap());
        assert_eq!(identity.device_class, DeviceClass::StorageClass);
        assert_eq!(identity.card_name, CardName::MifareStandard1K);
        assert!(identity.is_mifare_classic());

        let identity = CardIdentity::from_atr(&hex::decode(CLASSIC_4K_ATR).unwrap());
        assert_eq!(identity.card_name, CardName::MifareStandard4K);
    }

    #[test]
    fn test_identify_desfire() {
        let identity = CardIdentity::from_atr(DESFIRE_ATR);
        assert_eq!(identity.device_class, DeviceClass::MifareDesfire);
        assert_eq!(identity.card_name, CardName::Unknown);
    }

    #[test]
    fn test_identify_unknown() {
        assert_eq!(CardIdentity::from_atr(&[0x3F, 0x00]), CardIdentity::default());
        // single historical byte that is not the DESFire ATR
        assert_eq!(
            CardIdentity::from_atr(&[0x3B, 0x01, 0x80]),
            CardIdentity::default()
        );
        // foreign RID is ignored
        let atr = hex::decode("3B8F8001804F0CA000000001030001000000006E").unwrap();
        assert_eq!(CardIdentity::from_atr(&atr).device_class, DeviceClass::Unknown);
        // other tags are skipped by length
        let atr = hex::decode("3B848001801001AA3E").unwrap();
        assert_eq!(CardIdentity::from_atr(&atr), CardIdentity::default());
    }

    #[test]
    fn test_identify_truncated_tlv() {
        // AID TLV announces 12 bytes but only one follows
        let atr = hex::decode("3B858001804F0CA00067").unwrap();
        assert_eq!(Atr::parse(&atr).unwrap().tck_valid, Some(true));
        assert_eq!(CardIdentity::from_atr(&atr), CardIdentity::default());
    }

    #[test]
    fn test_card_name_codes() {
        assert_eq!(CardName::from(0x0026), CardName::MifareMini);
        assert_eq!(CardName::from(0x003A), CardName::MifareUltralightC);
        assert_eq!(CardName::from(0x1234), CardName::Other(0x1234));
        assert_eq!(CardName::Other(0x1234).to_string(), "Other(0x1234)");
    }
}
