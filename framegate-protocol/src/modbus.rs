//! Modbus RTU frame splitter.
//!
//! RTU normally runs on a serial line where frame boundaries come from
//! inter-frame silence. Over TCP the frames arrive back to back with no
//! delimiter, so this framer identifies boundaries by trying the handful of
//! lengths an RTU frame can have and validating the trailing CRC16.
//!
//! When every candidate length has been checked and failed, the reader
//! advances one byte and tries again: a corrupted or offset stream loses at
//! most one byte per failed alignment, and a valid frame anywhere in the
//! buffer eventually lines up. A candidate that is merely short of bytes
//! parks the decision until more input arrives, so the emitted frames do
//! not depend on how the stream was chunked.

use crate::crc::has_valid_trailing_crc;
use crate::error::ProtocolError;
use crate::MIN_RTU_FRAME_LENGTH;
use bytes::{Buf, Bytes, BytesMut};

/// Splits complete Modbus RTU frames out of a byte stream.
#[derive(Debug, Clone)]
pub struct ModbusRtuFramer {
    max_frame_length: usize,
}

impl ModbusRtuFramer {
    pub fn new(max_frame_length: usize) -> Self {
        assert!(
            max_frame_length >= MIN_RTU_FRAME_LENGTH,
            "max_frame_length must fit at least one RTU frame"
        );
        Self { max_frame_length }
    }

    /// Extracts the next complete RTU frame from `buf`.
    ///
    /// Returns `Ok(Some(frame))` when a frame with a valid CRC was found
    /// (the reader is advanced past it), or `Ok(None)` when the buffer
    /// cannot yield another frame yet.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        loop {
            if buf.len() < MIN_RTU_FRAME_LENGTH {
                return Ok(None);
            }

            if buf.len() > self.max_frame_length {
                // Drop the excess from the front so a hostile stream cannot
                // grow the buffer without bound; resynchronisation below
                // still finds any complete frame that remains.
                let drop = buf.len() - self.max_frame_length;
                buf.advance(drop);
            }

            match self.match_frame_length(buf) {
                Match::Frame(len) => return Ok(Some(buf.split_to(len).freeze())),
                // An in-bounds candidate is still short of bytes; it may
                // validate once the rest arrives, so the head must not move.
                Match::NeedMore => return Ok(None),
                Match::None => {
                    // Every candidate was checked and failed: shed one byte
                    // and realign.
                    buf.advance(1);
                }
            }
        }
    }

    /// Extracts every complete frame currently in `buf`.
    pub fn decode_all(&self, buf: &mut BytesMut) -> Result<Vec<Bytes>, ProtocolError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.decode(buf)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Tries the candidate lengths for a frame starting at the buffer head,
    /// in priority order, and returns the first one whose trailing CRC
    /// validates.
    ///
    /// The decision stops at the first candidate whose bytes have not all
    /// arrived: emitting a lower-priority match (or resyncing) before that
    /// candidate resolves would make the result depend on how the stream
    /// was chunked.
    fn match_frame_length(&self, buf: &[u8]) -> Match {
        for len in candidate_lengths(buf) {
            if len < MIN_RTU_FRAME_LENGTH || len > self.max_frame_length {
                continue;
            }
            if buf.len() < len {
                return Match::NeedMore;
            }
            if has_valid_trailing_crc(&buf[..len]) {
                return Match::Frame(len);
            }
        }
        Match::None
    }
}

enum Match {
    Frame(usize),
    NeedMore,
    None,
}

/// Candidate frame lengths for the PDU starting at `buf[0]`, in priority
/// order. Callers must ensure `buf.len() >= 2`.
pub(crate) fn candidate_lengths(buf: &[u8]) -> Vec<usize> {
    let function = buf[1];
    let mut candidates = Vec::with_capacity(3);

    // Exception response: unit + (function | 0x80) + exception code + CRC.
    if function & 0x80 != 0 {
        candidates.push(5);
        return candidates;
    }

    // Common fixed-length shape: requests for 01/02/03/04, request and
    // response for 05/06.
    candidates.push(8);

    // Read response: unit + function + byteCount + data[byteCount] + CRC.
    if buf.len() >= 3 {
        candidates.push(5 + buf[2] as usize);
    }

    // Write-multiple request (0x0F/0x10):
    // unit + function + start(2) + qty(2) + byteCount + data[byteCount] + CRC.
    if (function == 0x0F || function == 0x10) && buf.len() >= 7 {
        candidates.push(9 + buf[6] as usize);
    }

    candidates
}
