use mifare_apdu_core::Command;

use super::CLA_PCSC;

/// GET DATA instruction
pub const INS_GET_DATA: u8 = 0xCA;

/// GET DATA for the card UID: `FF CA 00 00 00`
pub const fn get_uid() -> Command {
    Command::new_with_le(CLA_PCSC, INS_GET_DATA, 0x00, 0x00, 0x00)
}

/// GET DATA for the ATS historical bytes: `FF CA 01 00 00`
pub const fn get_historical_bytes() -> Command {
    Command::new_with_le(CLA_PCSC, INS_GET_DATA, 0x01, 0x00, 0x00)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data() {
        assert_eq!(get_uid().to_bytes().unwrap().as_ref(), &[0xFF, 0xCA, 0x00, 0x00, 0x00]);
        assert_eq!(
            get_historical_bytes().to_bytes().unwrap().as_ref(),
            &[0xFF, 0xCA, 0x01, 0x00, 0x00]
        );
    }
}
