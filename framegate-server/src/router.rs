//! Request routing.

use framegate_protocol::{normalize_request_id, Request, Response};
use serde_json::json;

/// Maps a parsed request envelope to a response.
///
/// The only built-in action is `PING` (case-insensitive); every other
/// non-blank action is echoed back. The request ID is normalised before
/// the response is formed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestRouter;

impl RequestRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, request: &Request) -> Response {
        let request_id = normalize_request_id(request.request_id.as_deref());

        let action = request.action.as_deref().unwrap_or("");
        if action.trim().is_empty() {
            return Response::error(request_id, 400, "missing field: action");
        }

        if action.eq_ignore_ascii_case("PING") {
            return Response::ok(request_id, json!({"action": "PONG"}));
        }

        let mut data = json!({"echoAction": action});
        if let Some(ref echo) = request.data {
            data["echoData"] = echo.clone();
        }
        Response::ok(request_id, data)
    }
}
