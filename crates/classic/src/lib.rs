//! MIFARE Classic 1K/4K over PC/SC
//!
//! This crate speaks the PC/SC Part 3 storage-card command set to MIFARE
//! Classic cards. It covers:
//!
//! - the pseudo-APDU commands for key loading, authentication, reads and writes
//! - ATR parsing and card identification
//! - the trailer access-condition codec
//! - a sector/card model with lazy loading, dirty tracking and key-aware flushing
//!
//! The card is reached through any [`CardTransport`](mifare_apdu_core::CardTransport).

mod access;
mod atr;
mod block;
mod card;
pub mod commands;
mod config;
mod constants;
mod directory;
mod error;
mod keys;
mod reader;
mod sector;

#[cfg(test)]
mod mock;

pub use access::{
    AccessCondition, AccessConditions, DataAreaAccessCondition, MadVersion,
    TrailerAccessCondition,
};
pub use atr::{Atr, AtrError, CardIdentity, CardName, DeviceClass, InterfaceBytes};
pub use block::{DataBlock, sector_to_block};
pub use card::MifareCard;
pub use config::ClassicConfig;
pub use constants::*;
pub use directory::{ApplicationDirectory, ApplicationMad, DirectoryProvider};
pub use error::{Error, Result};
pub use keys::{KeyRole, KeyStore, LoginKey, MifareKey, SectorKeySet};
pub use reader::ClassicReader;
pub use sector::{Sector, SectorHandle};
