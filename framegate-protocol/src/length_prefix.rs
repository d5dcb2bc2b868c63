//! 4-byte big-endian length-prefixed framing.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Length of the frame header in bytes.
pub const HEADER_LENGTH: usize = 4;

/// Frames payloads behind a `u32` big-endian length field.
#[derive(Debug, Clone)]
pub struct LengthPrefixFramer {
    max_frame_length: usize,
}

impl LengthPrefixFramer {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    /// Extracts the next complete payload from `buf`.
    ///
    /// Returns `Ok(Some(payload))` with the header stripped, `Ok(None)`
    /// when more data is needed, or `FrameTooLong` when the declared length
    /// exceeds the configured bound (terminal for the connection).
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        if buf.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > self.max_frame_length {
            return Err(ProtocolError::FrameTooLong {
                len,
                max: self.max_frame_length,
            });
        }

        if buf.len() < HEADER_LENGTH + len {
            return Ok(None);
        }

        buf.advance(HEADER_LENGTH);
        Ok(Some(buf.split_to(len).freeze()))
    }

    /// Prepends the 4-byte big-endian length header to `payload`.
    pub fn encode(&self, payload: &[u8]) -> BytesMut {
        let mut out = BytesMut::with_capacity(HEADER_LENGTH + payload.len());
        out.put_u32(payload.len() as u32);
        out.put_slice(payload);
        out
    }
}
