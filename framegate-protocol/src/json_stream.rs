//! Incremental extraction of complete root JSON values from a byte stream.
//!
//! TCP delivers JSON in arbitrary fragments; this extractor buffers them
//! and emits each root-level value exactly when it completes, regardless of
//! where the chunk boundaries fall. Whitespace between root values is
//! absorbed silently.
//!
//! A malformed byte anywhere in the stream is unrecoverable: without a
//! framing layer there is no way to find the next value boundary, so the
//! error is terminal for the connection.

use crate::error::ProtocolError;
use bytes::{Buf, BytesMut};
use serde_json::Value;

/// Per-connection streaming JSON state.
///
/// Holds every byte of the value currently being accumulated; the buffer is
/// drained only when a root value completes. `pending_bytes` therefore
/// never exceeds `max_frame_length` on a healthy stream.
#[derive(Debug)]
pub struct JsonStreamExtractor {
    buf: BytesMut,
    max_frame_length: usize,
}

enum Step {
    Value(Value, usize),
    Incomplete,
}

impl JsonStreamExtractor {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_length,
        }
    }

    /// Bytes buffered toward the value currently in progress.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Feeds one inbound chunk and returns every root value it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Value>, ProtocolError> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.max_frame_length {
            return Err(ProtocolError::StreamTooLong {
                pending: self.buf.len(),
                max: self.max_frame_length,
            });
        }

        self.drain()
    }

    fn drain(&mut self) -> Result<Vec<Value>, ProtocolError> {
        let mut values = Vec::new();
        loop {
            self.skip_leading_whitespace();
            if self.buf.is_empty() {
                break;
            }

            let step = {
                let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
                match stream.next() {
                    Some(Ok(value)) => Step::Value(value, stream.byte_offset()),
                    Some(Err(e)) if e.is_eof() => Step::Incomplete,
                    Some(Err(e)) => return Err(ProtocolError::MalformedJson(e)),
                    None => Step::Incomplete,
                }
            };

            match step {
                Step::Value(value, consumed) => {
                    // A number ending flush with the buffer may still grow
                    // with the next chunk ("12" then "3"); hold it until a
                    // delimiter or further input proves it complete.
                    if consumed == self.buf.len() && value.is_number() {
                        break;
                    }
                    self.buf.advance(consumed);
                    values.push(value);
                }
                Step::Incomplete => break,
            }
        }
        Ok(values)
    }

    fn skip_leading_whitespace(&mut self) {
        let ws = self
            .buf
            .iter()
            .take_while(|&&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
            .count();
        if ws > 0 {
            self.buf.advance(ws);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAX: usize = 1024;

    #[test]
    fn test_single_object_in_one_chunk() {
        let mut extractor = JsonStreamExtractor::new(MAX);
        let values = extractor
            .feed(br#"{"requestId":"t1","action":"PING","data":{}}"#)
            .unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["action"], "PING");
        assert_eq!(extractor.pending_bytes(), 0);
    }

    #[test]
    fn test_object_split_at_every_boundary() {
        let bytes = br#"{"requestId":"t4","action":"PING","data":{"k":[1,2,3]}}"#;
        for split in 1..bytes.len() {
            let mut extractor = JsonStreamExtractor::new(MAX);
            let mut values = extractor.feed(&bytes[..split]).unwrap();
            values.extend(extractor.feed(&bytes[split..]).unwrap());

            assert_eq!(values.len(), 1, "split at {split}");
            assert_eq!(values[0]["requestId"], "t4", "split at {split}");
        }
    }

    #[test]
    fn test_concatenated_values_with_whitespace() {
        let mut extractor = JsonStreamExtractor::new(MAX);
        let values = extractor
            .feed(b" {\"a\":1}\r\n\t[2,3]  \"four\" {\"b\":5}")
            .unwrap();
        assert_eq!(
            values,
            vec![json!({"a": 1}), json!([2, 3]), json!("four"), json!({"b": 5})]
        );
    }

    #[test]
    fn test_scalar_roots() {
        let mut extractor = JsonStreamExtractor::new(MAX);
        let values = extractor.feed(b"true null \"hi\" ").unwrap();
        assert_eq!(values, vec![json!(true), json!(null), json!("hi")]);
    }

    #[test]
    fn test_keyword_split_across_chunks() {
        let mut extractor = JsonStreamExtractor::new(MAX);
        assert!(extractor.feed(b"tr").unwrap().is_empty());
        assert_eq!(extractor.feed(b"ue").unwrap(), vec![json!(true)]);
    }

    #[test]
    fn test_trailing_number_held_until_delimited() {
        let mut extractor = JsonStreamExtractor::new(MAX);
        // "12" could still grow into "123"; nothing is emitted yet.
        assert!(extractor.feed(b"12").unwrap().is_empty());
        assert!(extractor.feed(b"3").unwrap().is_empty());
        assert_eq!(extractor.feed(b" ").unwrap(), vec![json!(123)]);
    }

    #[test]
    fn test_values_in_same_chunk_as_partial_tail() {
        let mut extractor = JsonStreamExtractor::new(MAX);
        let values = extractor.feed(b"{\"a\":1}{\"b\":").unwrap();
        assert_eq!(values, vec![json!({"a": 1})]);
        assert_eq!(extractor.feed(b"2}").unwrap(), vec![json!({"b": 2})]);
        assert_eq!(extractor.pending_bytes(), 0);
    }

    #[test]
    fn test_malformed_stream_is_terminal() {
        let mut extractor = JsonStreamExtractor::new(MAX);
        let err = extractor.feed(b"{\"a\":1}{]").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedJson(_)));
    }

    #[test]
    fn test_not_json_text_is_malformed() {
        let mut extractor = JsonStreamExtractor::new(MAX);
        assert!(matches!(
            extractor.feed(b"not-a-json"),
            Err(ProtocolError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_accumulator_bound() {
        let mut extractor = JsonStreamExtractor::new(16);

        // An unterminated value may buffer up to the cap...
        assert!(extractor.feed(b"[1,2,3,4,5,6,7,8").unwrap().is_empty());
        // ...but one more byte without completing is terminal.
        assert!(matches!(
            extractor.feed(b",9"),
            Err(ProtocolError::StreamTooLong { .. })
        ));
    }

    #[test]
    fn test_value_exactly_at_cap_succeeds() {
        let payload = br#"{"k":"0123456789"}"#;
        let mut extractor = JsonStreamExtractor::new(payload.len());
        let values = extractor.feed(payload).unwrap();
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_pending_resets_after_each_value() {
        let mut extractor = JsonStreamExtractor::new(MAX);
        extractor.feed(b"{\"a\":").unwrap();
        assert!(extractor.pending_bytes() > 0);
        extractor.feed(b"1}").unwrap();
        assert_eq!(extractor.pending_bytes(), 0);
    }
}
