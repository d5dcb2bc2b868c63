//! # framegate-protocol
//!
//! Framing and decoding core for the framegate TCP server.
//!
//! This crate provides:
//! - CRC16/Modbus and a resynchronising Modbus RTU frame splitter
//! - An incremental JSON value extractor for unframed byte streams
//! - Length-prefixed and line-delimited framers
//! - Best-effort protocol auto-detection for new connections
//! - Request/Response envelope types
//!
//! Everything here is defined over byte buffers; socket I/O lives in
//! `framegate-server`.

pub mod crc;
pub mod detect;
pub mod envelope;
pub mod error;
pub mod json_stream;
pub mod length_prefix;
pub mod line;
pub mod modbus;

pub use crc::{crc16, has_valid_trailing_crc};
pub use detect::{AutoDetector, DetectedProtocol};
pub use envelope::{
    format_response, normalize_request_id, parse_request, request_from_value, Request, Response,
    FALLBACK_RESPONSE,
};
pub use error::ProtocolError;
pub use json_stream::JsonStreamExtractor;
pub use length_prefix::LengthPrefixFramer;
pub use line::LineFramer;
pub use modbus::ModbusRtuFramer;

/// Default bound on any single frame, and on the streaming JSON accumulator (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Minimum Modbus RTU frame length (an exception response: unit + function + code + CRC).
pub const MIN_RTU_FRAME_LENGTH: usize = 5;

/// Bytes the auto-detector buffers before defaulting to Modbus RTU.
pub const DEFAULT_DETECT_WINDOW: usize = 64;
