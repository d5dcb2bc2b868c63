//! Per-connection decoding pipeline.
//!
//! The decoder chain is a tagged state driven by explicit transitions: a
//! connection starts in the state its configured framing mode dictates, and
//! a connection in `Detecting` moves exactly once to `JsonStream` or
//! `ModbusRtu` when the auto-detector commits. The bytes retained during
//! detection are replayed into the committed decoder as its first input.
//!
//! Within one inbound chunk the active framer runs to quiescence: `feed`
//! returns only when the buffer cannot yield another message.

use crate::config::{FramingMode, TcpConfig};
use bytes::{Bytes, BytesMut};
use framegate_protocol::{
    AutoDetector, DetectedProtocol, JsonStreamExtractor, LengthPrefixFramer, LineFramer,
    ModbusRtuFramer, ProtocolError,
};
use serde_json::Value;
use std::time::Duration;

/// One decoded inbound message.
#[derive(Debug)]
pub enum Inbound {
    /// A framed JSON payload (length-field and line paths). A malformed
    /// payload here is contained: the connection stays open.
    Payload(Bytes),
    /// A complete root JSON value from the streaming extractor. A binding
    /// failure here is terminal for the connection.
    Value(Value),
    /// A binary frame (Modbus RTU) or an unframed raw chunk.
    Binary(Bytes),
}

enum DecoderState {
    Detecting {
        detector: AutoDetector,
        retained: BytesMut,
    },
    LengthPrefix {
        framer: LengthPrefixFramer,
        buf: BytesMut,
    },
    Line {
        framer: LineFramer,
        buf: BytesMut,
    },
    JsonStream {
        extractor: JsonStreamExtractor,
    },
    ModbusRtu {
        framer: ModbusRtuFramer,
        buf: BytesMut,
    },
    Raw,
}

/// Per-connection state: the active decoder, the idle-timeout setting and
/// the outbound framing for responses.
pub struct ConnectionPipeline {
    state: DecoderState,
    max_frame_length: usize,
    reader_idle: Option<Duration>,
}

impl ConnectionPipeline {
    pub fn new(config: &TcpConfig) -> Self {
        let max = config.max_frame_length;
        let state = match config.framing {
            FramingMode::Auto => DecoderState::Detecting {
                detector: AutoDetector::default(),
                retained: BytesMut::new(),
            },
            FramingMode::Raw => DecoderState::Raw,
            FramingMode::LengthField => DecoderState::LengthPrefix {
                framer: LengthPrefixFramer::new(max),
                buf: BytesMut::new(),
            },
            FramingMode::JsonObject => DecoderState::JsonStream {
                extractor: JsonStreamExtractor::new(max),
            },
            FramingMode::Line => DecoderState::Line {
                framer: LineFramer::new(max),
                buf: BytesMut::new(),
            },
            FramingMode::ModbusRtu => DecoderState::ModbusRtu {
                framer: ModbusRtuFramer::new(max),
                buf: BytesMut::new(),
            },
        };

        Self {
            state,
            max_frame_length: max,
            reader_idle: config.reader_idle(),
        }
    }

    /// Idle timeout for this connection, or `None` when disabled.
    pub fn reader_idle(&self) -> Option<Duration> {
        self.reader_idle
    }

    /// Feeds one inbound chunk and returns every message it completed.
    ///
    /// An error invalidates the connection's decoding state and must close
    /// the connection.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Inbound>, ProtocolError> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out)?;
        Ok(out)
    }

    fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<Inbound>) -> Result<(), ProtocolError> {
        // Detection retains bytes until it commits; the state swap must
        // happen before the retained bytes flow through the new decoder.
        if let DecoderState::Detecting { detector, retained } = &mut self.state {
            retained.extend_from_slice(chunk);
            let Some(protocol) = detector.inspect(retained) else {
                return Ok(());
            };
            let replay = std::mem::take(retained).freeze();
            self.commit(protocol);
            return self.feed_into(&replay, out);
        }

        match &mut self.state {
            DecoderState::Detecting { .. } => unreachable!("handled above"),
            DecoderState::LengthPrefix { framer, buf } => {
                buf.extend_from_slice(chunk);
                while let Some(payload) = framer.decode(buf)? {
                    out.push(Inbound::Payload(payload));
                }
            }
            DecoderState::Line { framer, buf } => {
                buf.extend_from_slice(chunk);
                while let Some(payload) = framer.decode(buf)? {
                    out.push(Inbound::Payload(payload));
                }
            }
            DecoderState::JsonStream { extractor } => {
                for value in extractor.feed(chunk)? {
                    out.push(Inbound::Value(value));
                }
            }
            DecoderState::ModbusRtu { framer, buf } => {
                buf.extend_from_slice(chunk);
                while let Some(frame) = framer.decode(buf)? {
                    out.push(Inbound::Binary(frame));
                }
            }
            DecoderState::Raw => {
                if !chunk.is_empty() {
                    out.push(Inbound::Binary(Bytes::copy_from_slice(chunk)));
                }
            }
        }
        Ok(())
    }

    /// Installs the detected decoder. Irreversible for the connection.
    fn commit(&mut self, protocol: DetectedProtocol) {
        tracing::debug!("auto-detect committed to {:?}", protocol);
        self.state = match protocol {
            DetectedProtocol::Json => DecoderState::JsonStream {
                extractor: JsonStreamExtractor::new(self.max_frame_length),
            },
            DetectedProtocol::ModbusRtu => DecoderState::ModbusRtu {
                framer: ModbusRtuFramer::new(self.max_frame_length),
                buf: BytesMut::new(),
            },
        };
    }

    /// Applies the outbound leg of the active framing to a response payload.
    ///
    /// Length-field prepends the 4-byte header, line appends an LF; the
    /// streaming, binary and raw paths write the payload as-is.
    pub fn encode_outbound(&self, payload: &[u8]) -> Bytes {
        match &self.state {
            DecoderState::LengthPrefix { framer, .. } => framer.encode(payload).freeze(),
            DecoderState::Line { framer, .. } => framer.encode(payload).freeze(),
            _ => Bytes::copy_from_slice(payload),
        }
    }
}
