//! Command execution on top of a raw transport
//!
//! [`Executor`] is implemented for every [`CardTransport`]: it serializes a
//! [`Command`], ships it, and parses the reply into a [`Response`]. Status
//! words are not interpreted here; callers decide what a failing one means.

use tracing::{Level, debug, info, instrument, warn};

use crate::command::Command;
use crate::response::Response;
use crate::transport::CardTransport;
use crate::Result;

/// Trait for APDU command execution
pub trait Executor {
    /// Execute a command and return the parsed response
    fn execute(&mut self, command: &Command) -> Result<Response>;

    /// Execute a command and return the payload, failing on a non-success status word
    fn execute_checked(&mut self, command: &Command) -> Result<bytes::Bytes> {
        Ok(self.execute(command)?.into_result()?)
    }
}

impl<T: CardTransport + ?Sized> Executor for T {
    #[instrument(level = "trace", skip_all, fields(command = %command))]
    fn execute(&mut self, command: &Command) -> Result<Response> {
        let raw = command.to_bytes()?;
        let reply = self.transmit_raw(&raw).map_err(Into::into)?;
        let response = Response::from_bytes(&reply)?;

        let status = response.status();
        let level = status.tracing_level();
        if level == Level::DEBUG {
            debug!(%status, "Command succeeded");
        } else if level == Level::INFO {
            info!(%status, description = status.description(), "Command returned a warning");
        } else {
            warn!(%status, description = status.description(), "Command failed");
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::transport::MockTransport;
    use crate::Error;

    #[test]
    fn test_execute_parses_response() {
        let mut transport = MockTransport::with_response(Bytes::from_static(&[
            0x04, 0xA2, 0x23, 0x91, 0x90, 0x00,
        ]));
        let response = transport
            .execute(&Command::new_with_le(0xFF, 0xCA, 0x00, 0x00, 0x00))
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.data(), &[0x04, 0xA2, 0x23, 0x91]);
        assert_eq!(transport.commands[0].as_ref(), &[0xFF, 0xCA, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_execute_checked_maps_status() {
        let mut transport = MockTransport::with_response(Bytes::from_static(&[0x63, 0x00]));
        let err = transport
            .execute_checked(&Command::new_with_le(0xFF, 0xB0, 0x00, 0x04, 0x10))
            .unwrap_err();
        assert!(matches!(err, Error::Status(s) if s.status.to_u16() == 0x6300));
    }

    #[test]
    fn test_execute_short_reply() {
        let mut transport = MockTransport::with_response(Bytes::from_static(&[0x90]));
        assert!(matches!(
            transport.execute(&Command::new(0xFF, 0xCA, 0x00, 0x00)),
            Err(Error::Response(_))
        ));
    }
}
