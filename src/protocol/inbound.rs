//! Inbound frame classification.
//!
//! Every text frame from the peer passes through [`Inbound::parse`], which
//! decides by shape where it goes. Shapes are checked in priority order:
//!
//! 1. `request` object with `id` and `endpoint` → inbound request
//! 2. `response` object with `id` and either `data` or `error` → response
//! 3. `event` equal to [`HANDSHAKE_EVENT`] → handshake acknowledgment
//! 4. `event` string → plain event

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::event::{EventFrame, HANDSHAKE_EVENT};
use super::request::{RequestBody, ResponseBody};

// ============================================================================
// Inbound
// ============================================================================

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Server-initiated request for a registered endpoint.
    Request(RequestBody),
    /// Response to one of our requests.
    Response(ResponseBody),
    /// Session establishment acknowledgment.
    Handshake(Value),
    /// Plain fire-and-forget event.
    Event(EventFrame),
}

impl Inbound {
    /// Parses and classifies a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the text is not JSON or matches
    /// none of the known shapes.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::malformed_frame(format!("invalid JSON: {e}")))?;

        let Value::Object(mut object) = value else {
            return Err(Error::malformed_frame("frame is not a JSON object"));
        };

        if let Some(body) = take_shaped(&mut object, "request", |o| {
            o.contains_key("id") && o.contains_key("endpoint")
        }) {
            return serde_json::from_value(body)
                .map(Self::Request)
                .map_err(|e| Error::malformed_frame(format!("bad request body: {e}")));
        }

        if let Some(body) = take_shaped(&mut object, "response", |o| {
            o.contains_key("id") && (o.contains_key("data") || o.contains_key("error"))
        }) {
            return serde_json::from_value(body)
                .map(Self::Response)
                .map_err(|e| Error::malformed_frame(format!("bad response body: {e}")));
        }

        if let Some(Value::String(event)) = object.remove("event") {
            let data = object.remove("data").unwrap_or(Value::Null);
            if event == HANDSHAKE_EVENT {
                return Ok(Self::Handshake(data));
            }
            return Ok(Self::Event(EventFrame { event, data }));
        }

        Err(Error::malformed_frame("unrecognized frame shape"))
    }

    /// Short label for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Handshake(_) => "handshake",
            Self::Event(_) => "event",
        }
    }
}

/// Removes `key` from `object` if it holds an object accepted by `shape`.
fn take_shaped(
    object: &mut Map<String, Value>,
    key: &str,
    shape: impl Fn(&Map<String, Value>) -> bool,
) -> Option<Value> {
    let matches = matches!(object.get(key), Some(Value::Object(inner)) if shape(inner));
    if matches { object.remove(key) } else { None }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::RequestId;

    #[test]
    fn test_parse_request() {
        let inbound =
            Inbound::parse(r#"{"request":{"id":"s-1","endpoint":"ping","data":{"n":1}}}"#)
                .expect("parse");

        match inbound {
            Inbound::Request(body) => {
                assert_eq!(body.id, RequestId::new("s-1"));
                assert_eq!(body.endpoint, "ping");
                assert_eq!(body.data, json!({ "n": 1 }));
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_response_with_data() {
        let inbound = Inbound::parse(r#"{"response":{"id":"r-1","data":[1,2]}}"#).expect("parse");
        assert!(matches!(inbound, Inbound::Response(ref b) if b.data == json!([1, 2])));
    }

    #[test]
    fn test_parse_response_with_error_only() {
        let inbound =
            Inbound::parse(r#"{"response":{"id":"r-1","error":{"code":404,"message":"x"}}}"#)
                .expect("parse");
        match inbound {
            Inbound::Response(body) => assert!(body.is_error()),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_response_without_payload_or_error_is_malformed() {
        let err = Inbound::parse(r#"{"response":{"id":"r-1"}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_parse_handshake() {
        let inbound = Inbound::parse(&format!(r#"{{"event":"{HANDSHAKE_EVENT}"}}"#)).expect("parse");
        assert_eq!(inbound, Inbound::Handshake(Value::Null));
        assert_eq!(inbound.kind(), "handshake");
    }

    #[test]
    fn test_parse_event() {
        let inbound = Inbound::parse(r#"{"event":"chat","data":"hello"}"#).expect("parse");
        assert_eq!(inbound, Inbound::Event(EventFrame::new("chat", json!("hello"))));
    }

    #[test]
    fn test_request_takes_priority_over_event() {
        let inbound = Inbound::parse(
            r#"{"event":"chat","request":{"id":"s-2","endpoint":"e"},"response":{"id":"x","data":1}}"#,
        )
        .expect("parse");
        assert_eq!(inbound.kind(), "request");
    }

    #[test]
    fn test_response_takes_priority_over_event() {
        let inbound =
            Inbound::parse(r#"{"event":"chat","response":{"id":"x","data":1}}"#).expect("parse");
        assert_eq!(inbound.kind(), "response");
    }

    #[test]
    fn test_incomplete_request_falls_through_to_event() {
        let inbound =
            Inbound::parse(r#"{"request":{"id":"s-3"},"event":"chat"}"#).expect("parse");
        assert_eq!(inbound.kind(), "event");
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = Inbound::parse("{not json").unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(Inbound::parse("[1,2,3]").is_err());
        assert!(Inbound::parse(r#""event""#).is_err());
    }

    #[test]
    fn test_non_string_request_id_is_malformed() {
        let err = Inbound::parse(r#"{"request":{"id":5,"endpoint":"e"}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_unknown_shape_is_malformed() {
        let err = Inbound::parse(r#"{"hello":"world"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }
}
