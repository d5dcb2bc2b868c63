//! Request and response envelopes.
//!
//! Inbound payloads are JSON objects with `requestId`, `action` and `data`
//! fields; anything else at the top level is ignored. Outbound responses
//! carry the five canonical fields, with `serverTime` rendered as an
//! RFC-3339 UTC instant at millisecond precision.

use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Emitted verbatim when a response fails to serialise.
pub const FALLBACK_RESPONSE: &[u8] = br#"{"code":500,"message":"internal server error"}"#;

/// Inbound request envelope.
///
/// All fields are optional at the parse layer; a missing `action` becomes a
/// 400-class router response rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Request {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outbound response envelope. `code == 0` means success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: String,
    pub code: i32,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(with = "rfc3339_millis")]
    pub server_time: DateTime<Utc>,
}

impl Response {
    /// Builds a success response carrying `data`.
    pub fn ok(request_id: impl Into<String>, data: Value) -> Self {
        Self {
            request_id: request_id.into(),
            code: 0,
            message: "ok".to_string(),
            data: Some(data),
            server_time: Utc::now(),
        }
    }

    /// Builds an error response with no data.
    pub fn error(request_id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            code,
            message: message.into(),
            data: None,
            server_time: Utc::now(),
        }
    }
}

/// Parses a single UTF-8 JSON object into a request envelope.
///
/// Trailing bytes after the object are an error; framed paths deliver
/// exactly one value per payload.
pub fn parse_request(payload: &[u8]) -> Result<Request, ProtocolError> {
    serde_json::from_slice(payload).map_err(ProtocolError::MalformedJson)
}

/// Binds an already-extracted JSON value to a request envelope
/// (streaming path).
pub fn request_from_value(value: Value) -> Result<Request, ProtocolError> {
    serde_json::from_value(value).map_err(ProtocolError::MalformedJson)
}

/// Serialises a response to its wire bytes. Total: a serialisation failure
/// yields [`FALLBACK_RESPONSE`].
pub fn format_response(response: &Response) -> Vec<u8> {
    serde_json::to_vec(response).unwrap_or_else(|_| FALLBACK_RESPONSE.to_vec())
}

/// Returns the request ID to respond with: the inbound one when present and
/// non-blank, otherwise a fresh UUID v4.
pub fn normalize_request_id(request_id: Option<&str>) -> String {
    match request_id {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

mod rfc3339_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_request() {
        let req =
            parse_request(br#"{"requestId":"t1","action":"PING","data":{"k":1}}"#).unwrap();
        assert_eq!(req.request_id.as_deref(), Some("t1"));
        assert_eq!(req.action.as_deref(), Some("PING"));
        assert_eq!(req.data, Some(json!({"k": 1})));
    }

    #[test]
    fn test_parse_ignores_unknown_top_level_fields() {
        let req = parse_request(br#"{"action":"X","trace":"abc","v":2}"#).unwrap();
        assert_eq!(req.action.as_deref(), Some("X"));
        assert!(req.request_id.is_none());
        assert!(req.data.is_none());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_request(b"not-a-json"),
            Err(ProtocolError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_parse_rejects_trailing_bytes() {
        assert!(parse_request(b"{\"action\":\"X\"} extra").is_err());
    }

    #[test]
    fn test_request_from_value_type_mismatch() {
        // A requestId that is not a string cannot bind.
        let err = request_from_value(json!({"requestId": 42})).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedJson(_)));
    }

    #[test]
    fn test_normalize_request_id_preserved() {
        assert_eq!(normalize_request_id(Some("t1")), "t1");
    }

    #[test]
    fn test_normalize_request_id_generates_uuid_v4() {
        for id in [None, Some(""), Some("   ")] {
            let generated = normalize_request_id(id);
            let parsed = Uuid::parse_str(&generated).unwrap();
            assert_eq!(parsed.get_version_num(), 4);
        }
    }

    #[test]
    fn test_response_roundtrip_preserves_fields() {
        let resp = Response::ok("t1", json!({"action": "PONG"}));
        let bytes = format_response(&resp);
        let parsed: Response = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed.request_id, "t1");
        assert_eq!(parsed.code, 0);
        assert_eq!(parsed.message, "ok");
        assert_eq!(parsed.data, Some(json!({"action": "PONG"})));
    }

    #[test]
    fn test_server_time_is_rfc3339_millis_utc() {
        let resp = Response::error("t2", 400, "missing field: action");
        let value: Value = serde_json::from_slice(&format_response(&resp)).unwrap();
        let time = value["serverTime"].as_str().unwrap();

        // e.g. 2026-08-02T10:15:30.123Z
        assert!(time.ends_with('Z'));
        let fraction = &time[time.find('.').unwrap() + 1..time.len() - 1];
        assert_eq!(fraction.len(), 3);
        DateTime::parse_from_rfc3339(time).unwrap();
    }

    #[test]
    fn test_error_response_has_no_data() {
        let resp = Response::error("t3", 400, "bad");
        let value: Value = serde_json::from_slice(&format_response(&resp)).unwrap();
        assert!(value.get("data").is_none());
        assert_eq!(value["code"], 400);
    }

    #[test]
    fn test_fallback_bytes_are_valid_json() {
        let value: Value = serde_json::from_slice(FALLBACK_RESPONSE).unwrap();
        assert_eq!(value["code"], 500);
    }
}
