//! Best-effort protocol detection for new connections.
//!
//! A connection configured for automatic framing buffers its first bytes
//! until one of the rules below fires, then commits to a single protocol
//! for the connection's lifetime:
//!
//! 1. The first non-whitespace byte is `{` or `[`: JSON.
//! 2. A frame with a valid CRC16 can be read at the buffer head: Modbus RTU.
//! 3. The detect window fills without a verdict: Modbus RTU by default.
//!
//! The caller retains every inspected byte and replays it into the
//! committed decoder.

use crate::crc::has_valid_trailing_crc;
use crate::modbus::candidate_lengths;
use crate::MIN_RTU_FRAME_LENGTH;

/// Highest valid Modbus unit identifier.
const MAX_UNIT_ID: u8 = 247;

/// The protocol a connection commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedProtocol {
    Json,
    ModbusRtu,
}

/// One-shot peek-and-commit protocol decider.
#[derive(Debug, Clone)]
pub struct AutoDetector {
    detect_window: usize,
}

impl AutoDetector {
    pub fn new(detect_window: usize) -> Self {
        assert!(detect_window > 0, "detect window must be non-empty");
        Self { detect_window }
    }

    /// Inspects the bytes buffered so far. Returns `Some` once the
    /// connection can commit, `None` to keep waiting for more input.
    pub fn inspect(&self, buf: &[u8]) -> Option<DetectedProtocol> {
        if buf.is_empty() {
            return None;
        }

        if looks_like_json(buf) {
            return Some(DetectedProtocol::Json);
        }

        if looks_like_modbus_rtu(buf) {
            return Some(DetectedProtocol::ModbusRtu);
        }

        // Undecided: wait for more bytes, up to the window.
        if buf.len() >= self.detect_window {
            return Some(DetectedProtocol::ModbusRtu);
        }
        None
    }
}

impl Default for AutoDetector {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DETECT_WINDOW)
    }
}

fn looks_like_json(buf: &[u8]) -> bool {
    for &b in buf {
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => continue,
            b'{' | b'[' => return true,
            _ => return false,
        }
    }
    false
}

fn looks_like_modbus_rtu(buf: &[u8]) -> bool {
    if buf.len() < MIN_RTU_FRAME_LENGTH {
        return false;
    }
    if buf[0] > MAX_UNIT_ID {
        return false;
    }

    candidate_lengths(buf)
        .into_iter()
        .any(|len| buf.len() >= len && has_valid_trailing_crc(&buf[..len]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODBUS_FRAMES: &str = "01020100003079e2010206000080008000a8b9";

    #[test]
    fn test_json_object_commits() {
        let detector = AutoDetector::default();
        assert_eq!(
            detector.inspect(br#"{"requestId":"t3""#),
            Some(DetectedProtocol::Json)
        );
    }

    #[test]
    fn test_json_array_with_leading_whitespace_commits() {
        let detector = AutoDetector::default();
        assert_eq!(
            detector.inspect(b" \t\r\n[1,2]"),
            Some(DetectedProtocol::Json)
        );
    }

    #[test]
    fn test_whitespace_only_keeps_waiting() {
        let detector = AutoDetector::default();
        assert_eq!(detector.inspect(b"   \r\n"), None);
    }

    #[test]
    fn test_valid_rtu_frame_commits() {
        let detector = AutoDetector::default();
        let data = hex::decode(MODBUS_FRAMES).unwrap();
        assert_eq!(detector.inspect(&data), Some(DetectedProtocol::ModbusRtu));
    }

    #[test]
    fn test_partial_rtu_frame_waits() {
        let detector = AutoDetector::default();
        let data = hex::decode(MODBUS_FRAMES).unwrap();
        assert_eq!(detector.inspect(&data[..4]), None);
    }

    #[test]
    fn test_invalid_unit_id_never_probes_modbus() {
        let detector = AutoDetector::default();
        // 0xF8 > 247, not whitespace, not a brace: undecided below the window.
        assert_eq!(detector.inspect(&[0xF8u8; 8]), None);
    }

    #[test]
    fn test_window_defaults_to_modbus() {
        let detector = AutoDetector::default();
        assert_eq!(
            detector.inspect(&[0xF8u8; crate::DEFAULT_DETECT_WINDOW]),
            Some(DetectedProtocol::ModbusRtu)
        );
    }

    #[test]
    fn test_empty_buffer_waits() {
        let detector = AutoDetector::default();
        assert_eq!(detector.inspect(b""), None);
    }
}
