//! APDU command definitions
//!
//! A command is a plain value: every command, whatever its purpose, reduces to
//! the same ISO/IEC 7816-4 wire shape `CLA INS P1 P2 [Lc DATA] [Le]`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::Error;

/// Expected length type for APDU commands
pub type ExpectedLength = u8;

/// Maximum payload carried by a short APDU
pub const MAX_SHORT_DATA: usize = 255;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Create a new command with both data and expected length
    pub fn new_with_data_and_le<T: Into<Bytes>>(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: T,
        le: ExpectedLength,
    ) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: Some(le),
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Command payload, empty when absent
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        // CLA INS P1 P2
        let mut length = 4;

        if let Some(data) = &self.data {
            length += 1 + data.len();
        }

        if self.le.is_some() {
            length += 1;
        }

        length
    }

    /// Convert to raw APDU bytes
    ///
    /// Fails if the payload does not fit in a short APDU.
    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = &self.data {
            if data.len() > MAX_SHORT_DATA {
                return Err(Error::InvalidCommandLength(data.len()));
            }
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        Ok(buffer.freeze())
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 4 {
            return Err(Error::InvalidCommandLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);

        if data.len() > 4 {
            let lc = data[4] as usize;

            if data.len() == 5 {
                // Only Le present, no data
                command.le = Some(data[4]);
            } else if data.len() >= 5 + lc {
                if lc > 0 {
                    command.data = Some(Bytes::copy_from_slice(&data[5..5 + lc]));
                }

                if data.len() == 5 + lc + 1 {
                    command.le = Some(data[5 + lc]);
                } else if data.len() > 5 + lc + 1 {
                    return Err(Error::InvalidCommandLength(data.len()));
                }
            } else {
                return Err(Error::InvalidCommandLength(data.len()));
            }
        }

        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X} {:02X}",
            self.cla, self.ins, self.p1, self.p2
        )?;
        if let Some(data) = &self.data {
            write!(f, " [{}]", hex::encode_upper(data))?;
        }
        if let Some(le) = self.le {
            write!(f, " Le={le:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization() {
        let data = Bytes::from_static(&[0x01, 0x00, 0x04, 0x60, 0x00]);
        let cmd = Command::new_with_data(0xFF, 0x86, 0x00, 0x00, data);
        let bytes = cmd.to_bytes().unwrap();

        assert_eq!(bytes.as_ref(), hex::decode("FF860000050100046000").unwrap());
    }

    #[test]
    fn test_command_serialization_with_le() {
        let cmd = Command::new_with_le(0xFF, 0xB0, 0x00, 0x04, 0x10);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), &[0xFF, 0xB0, 0x00, 0x04, 0x10]);
    }

    #[test]
    fn test_command_length() {
        let cmd1 = Command::new(0x00, 0xB0, 0x00, 0x00);
        assert_eq!(cmd1.command_length(), 4);

        let cmd2 = Command::new_with_le(0x00, 0xB0, 0x00, 0x00, 0xFF);
        assert_eq!(cmd2.command_length(), 5);

        let data = Bytes::from_static(&[0x01, 0x02, 0x03]);
        let cmd3 = Command::new_with_data(0x00, 0xD6, 0x00, 0x00, data.clone());
        assert_eq!(cmd3.command_length(), 8);

        let cmd4 = Command::new_with_data_and_le(0x00, 0xD6, 0x00, 0x00, data, 0xFF);
        assert_eq!(cmd4.command_length(), 9);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let cmd = Command::new_with_data(0xFF, 0xD6, 0x00, 0x00, vec![0u8; 256]);
        assert!(matches!(
            cmd.to_bytes(),
            Err(Error::InvalidCommandLength(256))
        ));
    }

    #[test]
    fn test_command_from_bytes() {
        let cmd = Command::from_bytes(&[0xFF, 0xCA, 0x00, 0x00]).unwrap();
        assert_eq!(cmd, Command::new(0xFF, 0xCA, 0x00, 0x00));

        let cmd = Command::from_bytes(&[0xFF, 0xCA, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(cmd.le, Some(0));
        assert!(cmd.data.is_none());

        let cmd = Command::from_bytes(&[0xFF, 0xD6, 0x00, 0x08, 0x02, 0xAA, 0xBB]).unwrap();
        assert_eq!(cmd.data(), &[0xAA, 0xBB]);
        assert!(cmd.le.is_none());

        let cmd = Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00, 0x01, 0x01, 0xFF]).unwrap();
        assert_eq!(cmd.data(), &[0x01]);
        assert_eq!(cmd.le, Some(0xFF));

        assert!(Command::from_bytes(&[0xFF, 0xB0]).is_err());
        assert!(Command::from_bytes(&[0xFF, 0xD6, 0x00, 0x00, 0x05, 0x01]).is_err());
    }

    #[test]
    fn test_display() {
        let cmd = Command::new_with_le(0xFF, 0xB0, 0x00, 0x04, 0x10);
        assert_eq!(cmd.to_string(), "FF B0 00 04 Le=10");
    }
}
