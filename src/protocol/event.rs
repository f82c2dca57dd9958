//! Event frame types.
//!
//! Events are fire-and-forget notifications that travel in both directions.
//! No reply is expected and no correlation identifier is attached.
//!
//! # Reserved Events
//!
//! | Name | Meaning |
//! |------|---------|
//! | [`HANDSHAKE_EVENT`] | Peer acknowledged the session; surfaces as `SessionEvent::Connect` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Reserved event name sent by the peer once the application-level session
/// is established.
///
/// Never forwarded to a user handler.
pub const HANDSHAKE_EVENT: &str = "__handshake__";

// ============================================================================
// EventFrame
// ============================================================================

/// A fire-and-forget event frame.
///
/// # Format
///
/// ```json
/// { "event": "chat.message", "data": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name used to select the handler.
    pub event: String,

    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    /// Creates a new event frame.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Returns `true` if this is the reserved handshake acknowledgment.
    #[inline]
    #[must_use]
    pub fn is_handshake(&self) -> bool {
        self.event == HANDSHAKE_EVENT
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let frame = EventFrame::new("chat.message", json!({ "text": "hi" }));
        let json = serde_json::to_string(&frame).expect("serialize");

        assert_eq!(json, r#"{"event":"chat.message","data":{"text":"hi"}}"#);
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_event_missing_data_defaults_to_null() {
        let frame: EventFrame = serde_json::from_str(r#"{"event":"ping"}"#).expect("parse");
        assert_eq!(frame.event, "ping");
        assert_eq!(frame.data, Value::Null);
    }

    #[test]
    fn test_handshake_detection() {
        assert!(EventFrame::new(HANDSHAKE_EVENT, Value::Null).is_handshake());
        assert!(!EventFrame::new("handshake", Value::Null).is_handshake());
    }
}
