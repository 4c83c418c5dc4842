//! PC/SC storage-card pseudo-APDUs
//!
//! All commands use the PC/SC pseudo-class `FF` and are addressed to the
//! reader, which translates them into MIFARE Classic air commands.

pub mod general_authenticate;
pub use general_authenticate::*;
pub mod get_data;
pub use get_data::*;
pub mod load_keys;
pub use load_keys::*;
pub mod read_binary;
pub use read_binary::*;
pub mod update_binary;
pub use update_binary::*;

/// PC/SC pseudo-class byte
pub const CLA_PCSC: u8 = 0xFF;
