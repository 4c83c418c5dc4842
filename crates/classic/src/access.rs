//! Trailer access-condition codec
//!
//! Bytes 6..=9 of a sector trailer hold three access bits (C1, C2, C3) for
//! each of the four columns (three data areas and the trailer itself), stored
//! once inverted and once plain, followed by the general purpose byte (GPB).
//! Each 3-bit code maps to a fixed permission template.

use derive_more::Display;

use crate::constants::FACTORY_ACCESS_BITS;

/// Who may perform an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum AccessCondition {
    /// Nobody
    Never,
    /// Holder of Key A
    KeyA,
    /// Holder of Key B
    KeyB,
    /// Holder of either key
    KeyAOrB,
}

use AccessCondition::{KeyA as A, KeyAOrB as AB, KeyB as B, Never as N};

/// Permissions on one data area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataAreaAccessCondition {
    /// READ
    pub read: AccessCondition,
    /// WRITE
    pub write: AccessCondition,
    /// INCREMENT (value blocks)
    pub increment: AccessCondition,
    /// DECREMENT, TRANSFER, RESTORE (value blocks)
    pub decrement: AccessCondition,
}

impl DataAreaAccessCondition {
    const fn new(
        read: AccessCondition,
        write: AccessCondition,
        increment: AccessCondition,
        decrement: AccessCondition,
    ) -> Self {
        Self {
            read,
            write,
            increment,
            decrement,
        }
    }
}

impl Default for DataAreaAccessCondition {
    fn default() -> Self {
        DATA_AREA_TEMPLATES[0].1
    }
}

/// Permissions on the sector trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrailerAccessCondition {
    /// Reading Key A
    pub key_a_read: AccessCondition,
    /// Writing Key A
    pub key_a_write: AccessCondition,
    /// Reading the access bits
    pub access_bits_read: AccessCondition,
    /// Writing the access bits
    pub access_bits_write: AccessCondition,
    /// Reading Key B
    pub key_b_read: AccessCondition,
    /// Writing Key B
    pub key_b_write: AccessCondition,
}

impl TrailerAccessCondition {
    const fn new(
        key_a_read: AccessCondition,
        key_a_write: AccessCondition,
        access_bits_read: AccessCondition,
        access_bits_write: AccessCondition,
        key_b_read: AccessCondition,
        key_b_write: AccessCondition,
    ) -> Self {
        Self {
            key_a_read,
            key_a_write,
            access_bits_read,
            access_bits_write,
            key_b_read,
            key_b_write,
        }
    }
}

impl Default for TrailerAccessCondition {
    /// Transport configuration (code `001`)
    fn default() -> Self {
        TRAILER_TEMPLATES[3].1
    }
}

/// MIFARE Application Directory advertised by the sector 0 GPB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum MadVersion {
    /// No directory
    #[default]
    NoMad,
    /// MAD in sector 0
    V1,
    /// MAD in sector 0 plus MAD2 in sector 16
    V2,
}

/// Decoded access bytes of a sector trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessConditions {
    /// Data areas 0, 1 and 2
    pub data_areas: [DataAreaAccessCondition; 3],
    /// Trailer permissions
    pub trailer: TrailerAccessCondition,
    /// Directory version from the GPB
    pub mad_version: MadVersion,
    /// Multi-application card flag from the GPB
    pub multi_application: bool,
}

/// `(C1C2C3, template)` for data areas, in lookup order
const DATA_AREA_TEMPLATES: [(u8, DataAreaAccessCondition); 8] = [
    (0b000, DataAreaAccessCondition::new(AB, AB, AB, AB)),
    (0b010, DataAreaAccessCondition::new(AB, N, N, N)),
    (0b100, DataAreaAccessCondition::new(AB, B, N, N)),
    (0b110, DataAreaAccessCondition::new(AB, B, B, AB)),
    (0b001, DataAreaAccessCondition::new(AB, N, N, AB)),
    (0b011, DataAreaAccessCondition::new(B, B, N, N)),
    (0b101, DataAreaAccessCondition::new(B, N, N, N)),
    (0b111, DataAreaAccessCondition::new(N, N, N, N)),
];

/// `(C1C2C3, template)` for the trailer, in lookup order; code `110` has no entry
const TRAILER_TEMPLATES: [(u8, TrailerAccessCondition); 7] = [
    (0b000, TrailerAccessCondition::new(N, A, A, N, A, A)),
    (0b010, TrailerAccessCondition::new(N, N, A, N, A, N)),
    (0b100, TrailerAccessCondition::new(N, B, AB, N, N, B)),
    (0b001, TrailerAccessCondition::new(N, A, A, A, A, A)),
    (0b011, TrailerAccessCondition::new(N, B, AB, B, N, B)),
    (0b101, TrailerAccessCondition::new(N, N, AB, B, N, N)),
    (0b111, TrailerAccessCondition::new(N, N, AB, N, N, N)),
];

/// Trailer code used when a condition matches no template
const TRAILER_FALLBACK_CODE: u8 = 0b011;

const GPB_MAD_V1: u8 = 0x01;
const GPB_MAD_V2: u8 = 0x02;
const GPB_MULTI_APPLICATION: u8 = 0x40;
const GPB_MAD_AVAILABLE: u8 = 0x80;

impl AccessConditions {
    /// Decode from a trailer block
    ///
    /// Only bytes 6..=9 are looked at. A block shorter than 10 bytes
    /// decodes as the factory trailer `FF 07 80 69`.
    pub fn decode(trailer: &[u8]) -> Self {
        let bits: [u8; 4] = trailer
            .get(6..10)
            .and_then(|b| b.try_into().ok())
            .unwrap_or(FACTORY_ACCESS_BITS);
        Self::decode_access_bits(bits)
    }

    /// Decode the four access bytes
    pub fn decode_access_bits(bits: [u8; 4]) -> Self {
        let [_, byte7, byte8, gpb] = bits;

        let code = |column: u8| -> u8 {
            let c1 = (byte7 >> (4 + column)) & 1;
            let c2 = (byte8 >> column) & 1;
            let c3 = (byte8 >> (4 + column)) & 1;
            (c1 << 2) | (c2 << 1) | c3
        };

        let data_areas = [0, 1, 2].map(|column| data_area_for_code(code(column)));
        let trailer = trailer_for_code(code(3));

        let mut mad_version = MadVersion::NoMad;
        if gpb & GPB_MAD_AVAILABLE != 0 {
            if gpb & GPB_MAD_V1 != 0 {
                mad_version = MadVersion::V1;
            }
            if gpb & GPB_MAD_V2 != 0 {
                mad_version = MadVersion::V2;
            }
        }

        Self {
            data_areas,
            trailer,
            mad_version,
            multi_application: gpb & GPB_MULTI_APPLICATION != 0,
        }
    }

    /// Encode into the four access bytes (trailer bytes 6..=9)
    pub fn encode(&self) -> [u8; 4] {
        let mut codes = [0u8; 4];
        for (code, area) in codes.iter_mut().zip(self.data_areas.iter()) {
            *code = code_for_data_area(area);
        }
        codes[3] = code_for_trailer(&self.trailer);

        let (mut c1, mut c2, mut c3) = (0u8, 0u8, 0u8);
        for (column, code) in codes.iter().enumerate() {
            c1 |= ((code >> 2) & 1) << column;
            c2 |= ((code >> 1) & 1) << column;
            c3 |= (code & 1) << column;
        }

        let byte6 = (!c1 & 0x0F) | ((!c2 & 0x0F) << 4);
        let byte7 = (!c3 & 0x0F) | (c1 << 4);
        let byte8 = c2 | (c3 << 4);

        let mut gpb = match self.mad_version {
            MadVersion::NoMad => 0,
            MadVersion::V1 => GPB_MAD_V1 | GPB_MAD_AVAILABLE,
            MadVersion::V2 => GPB_MAD_V2 | GPB_MAD_AVAILABLE,
        };
        if self.multi_application {
            gpb |= GPB_MULTI_APPLICATION;
        }

        [byte6, byte7, byte8, gpb]
    }

    /// Write key for a data area: A iff the area's write condition is `KeyA`
    pub const fn data_area_write_role(&self, area: usize) -> crate::KeyRole {
        let area = if area < 3 { area } else { 2 };
        match self.data_areas[area].write {
            AccessCondition::KeyA => crate::KeyRole::A,
            _ => crate::KeyRole::B,
        }
    }

    /// Write key for the trailer: A iff `access_bits_write` is `KeyA`
    pub const fn trailer_write_role(&self) -> crate::KeyRole {
        match self.trailer.access_bits_write {
            AccessCondition::KeyA => crate::KeyRole::A,
            _ => crate::KeyRole::B,
        }
    }
}

impl Default for AccessConditions {
    /// Factory access conditions (`FF 07 80 69`)
    fn default() -> Self {
        Self::decode_access_bits(FACTORY_ACCESS_BITS)
    }
}

fn data_area_for_code(code: u8) -> DataAreaAccessCondition {
    DATA_AREA_TEMPLATES
        .iter()
        .find(|(c, _)| *c == code)
        .map_or(DATA_AREA_TEMPLATES[0].1, |(_, template)| *template)
}

fn trailer_for_code(code: u8) -> TrailerAccessCondition {
    TRAILER_TEMPLATES
        .iter()
        .find(|(c, _)| *c == code)
        .map_or(TRAILER_TEMPLATES[0].1, |(_, template)| *template)
}

fn code_for_data_area(area: &DataAreaAccessCondition) -> u8 {
    DATA_AREA_TEMPLATES
        .iter()
        .find(|(_, template)| template == area)
        .map_or(DATA_AREA_TEMPLATES[0].0, |(code, _)| *code)
}

fn code_for_trailer(trailer: &TrailerAccessCondition) -> u8 {
    TRAILER_TEMPLATES
        .iter()
        .find(|(_, template)| template == trailer)
        .map_or(TRAILER_FALLBACK_CODE, |(code, _)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyRole;

    fn with_trailer(trailer: TrailerAccessCondition) -> AccessConditions {
        AccessConditions {
            trailer,
            ..Default::default()
        }
    }

    #[test]
    fn test_factory_trailer() {
        let trailer = hex::decode("FFFFFFFFFFFFFF078069FFFFFFFFFFFF").unwrap();
        let access = AccessConditions::decode(&trailer);
        assert_eq!(access, AccessConditions::default());
        assert_eq!(access.data_areas, [DATA_AREA_TEMPLATES[0].1; 3]);
        assert_eq!(access.trailer, TrailerAccessCondition::default());
        assert_eq!(access.trailer.access_bits_write, AccessCondition::KeyA);
        assert_eq!(access.mad_version, MadVersion::NoMad);
        assert!(access.multi_application);
        // unassigned GPB bits are not carried over
        assert_eq!(access.encode(), [0xFF, 0x07, 0x80, 0x40]);
    }

    #[test]
    fn test_absent_trailer_decodes_as_factory() {
        assert_eq!(AccessConditions::decode(&[]), AccessConditions::default());
        assert_eq!(
            AccessConditions::decode(&[0x00; 8]),
            AccessConditions::decode_access_bits(FACTORY_ACCESS_BITS)
        );
    }

    #[test]
    fn test_data_area_templates_round_trip() {
        for (code, template) in DATA_AREA_TEMPLATES {
            for column in 0..3 {
                let mut access = AccessConditions::default();
                access.data_areas[column] = template;
                let decoded = AccessConditions::decode_access_bits(access.encode());
                assert_eq!(decoded, access, "code {code:03b} in area {column}");
            }
        }
    }

    #[test]
    fn test_trailer_templates_round_trip() {
        for (code, template) in TRAILER_TEMPLATES {
            let access = with_trailer(template);
            let decoded = AccessConditions::decode_access_bits(access.encode());
            assert_eq!(decoded.trailer, template, "code {code:03b}");
        }
    }

    #[test]
    fn test_bit_layout() {
        // area0 = 100, area1 = 010, area2 = 001, trailer = 011
        let access = AccessConditions {
            data_areas: [
                DATA_AREA_TEMPLATES[2].1,
                DATA_AREA_TEMPLATES[1].1,
                DATA_AREA_TEMPLATES[4].1,
            ],
            trailer: TRAILER_TEMPLATES[4].1,
            mad_version: MadVersion::NoMad,
            multi_application: false,
        };
        // C1 = 0001, C2 = 1010, C3 = 1100
        assert_eq!(access.encode(), [0x5E, 0x13, 0xCA, 0x00]);
    }

    #[test]
    fn test_inverted_nibbles() {
        for (_, template) in DATA_AREA_TEMPLATES {
            let access = AccessConditions {
                data_areas: [template; 3],
                ..Default::default()
            };
            let [b6, b7, b8, _] = access.encode();
            assert_eq!(b6 & 0x0F, !(b7 >> 4) & 0x0F);
            assert_eq!(b6 >> 4, !b8 & 0x0F);
            assert_eq!(b7 & 0x0F, !(b8 >> 4) & 0x0F);
        }
    }

    #[test]
    fn test_unknown_trailer_code_decodes_as_first_template() {
        // trailer column C1C2C3 = 110
        let decoded = AccessConditions::decode_access_bits([0x00, 0x80, 0x08, 0x00]);
        assert_eq!(decoded.trailer, TRAILER_TEMPLATES[0].1);
    }

    #[test]
    fn test_unmatched_conditions_encode_fallback() {
        let odd_area = DataAreaAccessCondition::new(A, A, A, A);
        let odd_trailer = TrailerAccessCondition::new(AB, AB, AB, AB, AB, AB);
        let access = AccessConditions {
            data_areas: [odd_area; 3],
            trailer: odd_trailer,
            mad_version: MadVersion::NoMad,
            multi_application: false,
        };

        let decoded = AccessConditions::decode_access_bits(access.encode());
        assert_eq!(decoded.data_areas, [DATA_AREA_TEMPLATES[0].1; 3]);
        assert_eq!(decoded.trailer, TRAILER_TEMPLATES[4].1);
    }

    #[test]
    fn test_gpb() {
        let mut access = AccessConditions {
            mad_version: MadVersion::V1,
            multi_application: false,
            ..Default::default()
        };
        assert_eq!(access.encode()[3], 0x81);

        access.mad_version = MadVersion::V2;
        access.multi_application = true;
        assert_eq!(access.encode()[3], 0xC2);

        assert_eq!(
            AccessConditions::decode_access_bits([0xFF, 0x07, 0x80, 0xC1]).mad_version,
            MadVersion::V1
        );
        assert_eq!(
            AccessConditions::decode_access_bits([0xFF, 0x07, 0x80, 0x83]).mad_version,
            MadVersion::V2
        );
        // MAD bits without the availability flag
        assert_eq!(
            AccessConditions::decode_access_bits([0xFF, 0x07, 0x80, 0x03]).mad_version,
            MadVersion::NoMad
        );
    }

    #[test]
    fn test_write_roles() {
        let mut access = AccessConditions::default();
        assert_eq!(access.data_area_write_role(0), KeyRole::B);
        assert_eq!(access.trailer_write_role(), KeyRole::A);

        access.data_areas[1].write = AccessCondition::KeyA;
        assert_eq!(access.data_area_write_role(1), KeyRole::A);

        access.trailer = TRAILER_TEMPLATES[4].1;
        assert_eq!(access.trailer_write_role(), KeyRole::B);
    }
}
