use mifare_apdu_core::Command;

use super::CLA_PCSC;
use crate::{Error, Result};

/// GENERAL AUTHENTICATE instruction
pub const INS_GENERAL_AUTHENTICATE: u8 = 0x86;

/// Key type byte for Key A
pub const KEY_TYPE_A: u8 = 0x60;

/// Key type byte for Key B
pub const KEY_TYPE_B: u8 = 0x61;

const AUTHENTICATE_VERSION: u8 = 0x01;

/// GENERAL AUTHENTICATE: `FF 86 00 00 05 [01 addrHi addrLo keyType slot]`
pub fn general_authenticate(block_address: u16, key_type: u8, key_slot: u8) -> Result<Command> {
    if key_type != KEY_TYPE_A && key_type != KEY_TYPE_B {
        return Err(Error::InvalidKeyType(key_type));
    }

    let [hi, lo] = block_address.to_be_bytes();
    Ok(Command::new_with_data(
        CLA_PCSC,
        INS_GENERAL_AUTHENTICATE,
        0x00,
        0x00,
        vec![AUTHENTICATE_VERSION, hi, lo, key_type, key_slot],
    ))
}
