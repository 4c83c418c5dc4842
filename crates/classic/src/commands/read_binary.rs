use mifare_apdu_core::Command;

use super::CLA_PCSC;

/// READ BINARY instruction
pub const INS_READ_BINARY: u8 = 0xB0;

/// READ BINARY: `FF B0 addrHi addrLo Le`
pub fn read_binary(address: u16, expected_len: u8) -> Command {
    let [hi, lo] = address.to_be_bytes();
    Command::new_with_le(CLA_PCSC, INS_READ_BINARY, hi, lo, expected_len)
}
