//! Core types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for working with smart card
//! APDU commands and responses according to ISO/IEC 7816-4.
//!
//! ## Overview
//!
//! - Building and parsing command frames (`CLA INS P1 P2 [Lc DATA] [Le]`)
//! - Parsing response frames (`DATA SW1 SW2`) and interpreting status words
//! - Talking to a card through any [`CardTransport`]
//! - Error handling shared by the transports and card applications built on top
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod executor;
pub mod response;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use command::{Command, ExpectedLength};
pub use executor::Executor;
pub use response::status::StatusWord;
pub use response::{Response, utils};
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, Command, Error, Response, Result,
        executor::Executor,
        response::error::{ResponseError, StatusError},
        response::status::StatusWord,
        transport::{CardTransport, TransportError},
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let cmd = Command::new(0xFF, 0xCA, 0x00, 0x00);
        assert_eq!(cmd.cla, 0xFF);
        assert_eq!(cmd.ins, 0xCA);

        let resp = Response::success(Bytes::from_static(&[0x01, 0x02, 0x03]));
        assert!(resp.is_success());
        assert_eq!(resp.data(), &[0x01, 0x02, 0x03]);
        assert_eq!(resp.status(), StatusWord::new(0x90, 0x00));
    }
}
