//! APDU response definitions
//!
//! A response frame is `DATA SW1 SW2`; it succeeded iff `SW1 SW2 = 90 00`.

pub mod error;
pub mod status;
pub mod utils;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use error::{ResponseError, StatusError};
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data, empty when the card returned only a status word
    data: Bytes,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(data: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            data: data.into(),
            status: status.into(),
        }
    }

    /// Create a success response
    pub fn success(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            status: status::common::SUCCESS,
        }
    }

    /// Create an error response from a status word
    pub fn error(status: impl Into<StatusWord>) -> Self {
        Self {
            data: Bytes::new(),
            status: status.into(),
        }
    }

    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ResponseError> {
        let (status, payload) = utils::extract_status_and_payload(raw)?;

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        Ok(Self {
            data: Bytes::copy_from_slice(payload),
            status,
        })
    }

    /// Response payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Status word as `SW1 << 8 | SW2`
    pub const fn status_word(&self) -> u16 {
        self.status.to_u16()
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the status word as a tuple (SW1, SW2)
    pub const fn status_tuple(&self) -> (u8, u8) {
        (self.status.sw1, self.status.sw2)
    }

    /// Convert into the payload, failing on a non-success status word
    pub fn into_result(self) -> Result<Bytes, StatusError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(StatusError::new(self.status.sw1, self.status.sw2))
        }
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = ResponseError;

    fn try_from(raw: &[u8]) -> Result<Self, ResponseError> {
        Self::from_bytes(raw)
    }
}

impl TryFrom<Bytes> for Response {
    type Error = ResponseError;

    fn try_from(raw: Bytes) -> Result<Self, ResponseError> {
        Self::from_bytes(&raw)
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        let mut buf = BytesMut::with_capacity(response.data.len() + 2);
        buf.put_slice(&response.data);
        buf.put_u8(response.status.sw1);
        buf.put_u8(response.status.sw2);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_creation() {
        let resp = Response::new(vec![0x01, 0x02, 0x03], (0x90, 0x00));
        assert_eq!(resp.data(), &[0x01, 0x02, 0x03]);
        assert_eq!(resp.status(), StatusWord::new(0x90, 0x00));
        assert_eq!(resp.status_word(), 0x9000);
        assert!(resp.is_success());
    }

    #[test]
    fn test_response_from_bytes() {
        let resp = Response::from_bytes(&[0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();
        assert_eq!(resp.data(), &[0x01, 0x02, 0x03]);
        assert!(resp.is_success());

        let resp = Response::from_bytes(&[0x63, 0x00]).unwrap();
        assert!(resp.data().is_empty());
        assert!(!resp.is_success());

        assert!(matches!(
            Response::from_bytes(&[0x01]),
            Err(ResponseError::Incomplete)
        ));
    }

    #[test]
    fn test_response_into_result() {
        let success = Response::success(Bytes::from_static(&[0x01, 0x02, 0x03]));
        assert_eq!(success.into_result().unwrap().as_ref(), &[0x01, 0x02, 0x03]);

        let error = Response::error((0x6A, 0x82));
        assert_eq!(error.into_result().unwrap_err().status.to_u16(), 0x6A82);
    }

    #[test]
    fn test_response_to_bytes() {
        let resp = Response::new(vec![0xAB], (0x90, 0x00));
        let raw: Bytes = resp.into();
        assert_eq!(raw.as_ref(), &[0xAB, 0x90, 0x00]);
    }
}
