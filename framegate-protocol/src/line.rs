//! Line-delimited framing: LF terminated inbound (CRLF tolerated), LF
//! appended outbound.

use crate::error::ProtocolError;
use bytes::{Bytes, BytesMut};

/// Splits inbound bytes on line feeds and terminates outbound payloads.
#[derive(Debug, Clone)]
pub struct LineFramer {
    max_frame_length: usize,
}

impl LineFramer {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    /// Extracts the next line from `buf`, with the LF (and a preceding CR)
    /// stripped.
    ///
    /// An unterminated prefix longer than the configured bound is
    /// `FrameTooLong` (terminal for the connection).
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
            if buf.len() > self.max_frame_length {
                return Err(ProtocolError::FrameTooLong {
                    len: buf.len(),
                    max: self.max_frame_length,
                });
            }
            return Ok(None);
        };

        let mut line = buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }

        if line.len() > self.max_frame_length {
            return Err(ProtocolError::FrameTooLong {
                len: line.len(),
                max: self.max_frame_length,
            });
        }
        Ok(Some(line.freeze()))
    }

    /// Appends an LF unless the payload already ends with one.
    pub fn encode(&self, payload: &[u8]) -> BytesMut {
        let mut out = BytesMut::with_capacity(payload.len() + 1);
        out.extend_from_slice(payload);
        if out.last() != Some(&b'\n') {
            out.extend_from_slice(b"\n");
        }
        out
    }
}
