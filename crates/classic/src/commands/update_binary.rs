use mifare_apdu_core::Command;

use super::CLA_PCSC;
use crate::constants::BLOCK_SIZE;
use crate::{Error, Result};

/// UPDATE BINARY instruction
pub const INS_UPDATE_BINARY: u8 = 0xD6;

/// UPDATE BINARY: `FF D6 addrHi addrLo 10 data`
///
/// MIFARE writes are always a full block: shorter input is zero padded,
/// longer input is rejected.
pub fn update_binary(address: u16, data: &[u8]) -> Result<Command> {
    if data.len() > BLOCK_SIZE {
        return Err(Error::PayloadTooLong(data.len()));
    }

    let mut block = [0u8; BLOCK_SIZE];
    block[..data.len()].copy_from_slice(data);

    let [hi, lo] = address.to_be_bytes();
    Ok(Command::new_with_data(
        CLA_PCSC,
        INS_UPDATE_BINARY,
        hi,
        lo,
        block.to_vec(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_binary_pads() {
        let cmd = update_binary(8, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(
            cmd.to_bytes().unwrap().as_ref(),
            hex::decode("FFD600081001020300000000000000000000000000").unwrap()
        );
    }

    #[test]
    fn test_update_binary_full_block() {
        let data = [0x5A; 16];
        let cmd = update_binary(0x80, &data).unwrap();
        assert_eq!(cmd.data(), &data);
        assert_eq!((cmd.p1, cmd.p2), (0x00, 0x80));
    }

    #[test]
    fn test_update_binary_too_long() {
        assert!(matches!(
            update_binary(8, &[0u8; 17]),
            Err(Error::PayloadTooLong(17))
        ));
    }
}
