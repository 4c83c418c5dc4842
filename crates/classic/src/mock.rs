//! In-memory MIFARE Classic card behind a PC/SC reader, for tests

use std::collections::HashMap;

use bytes::Bytes;
use mifare_apdu_core::{CardTransport, Command, TransportError};

use crate::access::{AccessCondition, AccessConditions};
use crate::constants::{BLOCK_SIZE, FACTORY_ACCESS_BITS, FACTORY_KEY, trailer};
use crate::keys::KeyRole;

const OK: &[u8] = &[0x90, 0x00];
const AUTH_FAILED: &[u8] = &[0x63, 0x00];
const NOT_ALLOWED: &[u8] = &[0x69, 0x82];
const NOT_SUPPORTED: &[u8] = &[0x6A, 0x81];

pub(crate) const MOCK_ATR: &str = "3B8F8001804F0CA000000306030001000000006A";
pub(crate) const MOCK_UID: &[u8] = &[0x04, 0xA2, 0x23, 0x91];

/// Simulated 4K card: 256 blocks with factory trailers
#[derive(Debug, Clone)]
pub(crate) struct MockCard {
    pub(crate) blocks: Vec<[u8; BLOCK_SIZE]>,
    pub(crate) commands: Vec<Bytes>,
    pub(crate) fail_reads: bool,
    pub(crate) uid: Option<Bytes>,
    pub(crate) atr: Option<Bytes>,
    loaded_keys: HashMap<u8, [u8; 6]>,
    authenticated: Option<(u8, KeyRole)>,
}

fn locate(address: u16) -> (u8, u8) {
    if address < 128 {
        ((address / 4) as u8, (address % 4) as u8)
    } else {
        let rest = address - 128;
        (32 + (rest / 16) as u8, (rest % 16) as u8)
    }
}

fn trailer_address(sector: u8) -> usize {
    if sector < 32 {
        sector as usize * 4 + 3
    } else {
        128 + (sector as usize - 32) * 16 + 15
    }
}

impl MockCard {
    pub(crate) fn new() -> Self {
        let mut blocks = vec![[0u8; BLOCK_SIZE]; 256];
        for sector in 0..40 {
            let block = &mut blocks[trailer_address(sector)];
            block[trailer::KEY_A].copy_from_slice(&FACTORY_KEY);
            block[trailer::ACCESS_BITS].copy_from_slice(&FACTORY_ACCESS_BITS);
            block[trailer::KEY_B].copy_from_slice(&FACTORY_KEY);
        }
        Self {
            blocks,
            commands: Vec::new(),
            fail_reads: false,
            uid: Some(Bytes::from_static(MOCK_UID)),
            atr: Some(Bytes::from(hex::decode(MOCK_ATR).unwrap())),
            loaded_keys: HashMap::new(),
            authenticated: None,
        }
    }

    pub(crate) fn trailer_mut(&mut self, sector: u8) -> &mut [u8; BLOCK_SIZE] {
        &mut self.blocks[trailer_address(sector)]
    }

    pub(crate) fn block(&self, sector: u8, block: u8) -> &[u8; BLOCK_SIZE] {
        let base = trailer_address(sector) + 1 - if sector < 32 { 4 } else { 16 };
        &self.blocks[base + block as usize]
    }

    /// Commands sent with the given instruction byte
    pub(crate) fn sent(&self, ins: u8) -> Vec<&Bytes> {
        self.commands.iter().filter(|c| c[1] == ins).collect()
    }

    fn allowed(&self, condition: AccessCondition, role: KeyRole) -> bool {
        match condition {
            AccessCondition::Never => false,
            AccessCondition::KeyA => role == KeyRole::A,
            AccessCondition::KeyB => role == KeyRole::B,
            AccessCondition::KeyAOrB => true,
        }
    }

    fn authenticate(&mut self, data: &[u8]) -> &'static [u8] {
        let address = u16::from_be_bytes([data[1], data[2]]);
        let (sector, _) = locate(address);
        let role = if data[3] == 0x60 { KeyRole::A } else { KeyRole::B };
        let trailer_block = self.blocks[trailer_address(sector)];
        let expected = match role {
            KeyRole::A => &trailer_block[trailer::KEY_A],
            KeyRole::B => &trailer_block[trailer::KEY_B],
        };

        match self.loaded_keys.get(&data[4]) {
            Some(key) if key.as_slice() == expected => {
                self.authenticated = Some((sector, role));
                OK
            }
            _ => {
                self.authenticated = None;
                AUTH_FAILED
            }
        }
    }

    fn read(&self, address: u16) -> Bytes {
        let (sector, _) = locate(address);
        if self.fail_reads || !matches!(self.authenticated, Some((s, _)) if s == sector) {
            return Bytes::from_static(NOT_ALLOWED);
        }
        let mut data = self.blocks[address as usize].to_vec();
        if address as usize == trailer_address(sector) {
            // Key A never leaves the card
            data[trailer::KEY_A].fill(0);
        }
        data.extend_from_slice(OK);
        Bytes::from(data)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> &'static [u8] {
        let (sector, block) = locate(address);
        let Some((auth_sector, role)) = self.authenticated else {
            return NOT_ALLOWED;
        };
        if auth_sector != sector || data.len() != BLOCK_SIZE {
            return NOT_ALLOWED;
        }

        let access = AccessConditions::decode(&self.blocks[trailer_address(sector)]);
        let is_trailer = address as usize == trailer_address(sector);
        let condition = if is_trailer {
            access.trailer.access_bits_write
        } else {
            let area = if sector < 32 { block as usize } else { block as usize / 5 };
            access.data_areas[area].write
        };
        if !self.allowed(condition, role) {
            return NOT_ALLOWED;
        }

        self.blocks[address as usize].copy_from_slice(data);
        OK
    }
}

impl CardTransport for MockCard {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        self.commands.push(Bytes::copy_from_slice(command));

        let command = Command::from_bytes(command).map_err(|_| TransportError::Device)?;
        let (p1, p2) = (command.p1, command.p2);
        let address = u16::from_be_bytes([p1, p2]);
        let body = command.data();

        let reply = match command.ins {
            0x82 => {
                let key: [u8; 6] = body.try_into().map_err(|_| TransportError::Device)?;
                self.loaded_keys.insert(p2, key);
                Bytes::from_static(OK)
            }
            0x86 => Bytes::from_static(self.authenticate(body)),
            0xB0 => self.read(address),
            0xD6 => Bytes::from_static(self.write(address, body)),
            0xCA => {
                let value = match p1 {
                    0x00 => self.uid.clone(),
                    _ => self.atr.as_ref().map(|atr| atr.slice(4..atr.len() - 1)),
                };
                match value {
                    Some(value) => {
                        let mut reply = value.to_vec();
                        reply.extend_from_slice(OK);
                        Bytes::from(reply)
                    }
                    None => Bytes::from_static(NOT_SUPPORTED),
                }
            }
            _ => Bytes::from_static(NOT_SUPPORTED),
        };
        Ok(reply)
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn atr(&self) -> Option<Bytes> {
        self.atr.clone()
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.authenticated = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_frames() {
        let mut mock = MockCard::new();
        assert!(matches!(
            mock.do_transmit_raw(&[0xFF, 0xB0]),
            Err(TransportError::Device)
        ));
        // Lc claims more data than the frame carries
        assert!(matches!(
            mock.do_transmit_raw(&[0xFF, 0xD6, 0x00, 0x04, 0x10, 0x01]),
            Err(TransportError::Device)
        ));
        assert_eq!(mock.commands.len(), 2);
    }

    #[test]
    fn test_read_hides_key_a() {
        let mut mock = MockCard::new();
        mock.loaded_keys.insert(0, FACTORY_KEY);
        let auth = mock
            .do_transmit_raw(&[0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, 0x07, 0x60, 0x00])
            .unwrap();
        assert_eq!(auth.as_ref(), OK);

        let reply = mock.do_transmit_raw(&[0xFF, 0xB0, 0x00, 0x07, 0x10]).unwrap();
        assert_eq!(&reply[trailer::KEY_A], &[0x00; 6]);
        assert_eq!(&reply[trailer::ACCESS_BITS], &FACTORY_ACCESS_BITS);
        assert_eq!(&reply[16..], OK);
    }
}
