//! Request and Response frame types.
//!
//! Either side may send a request; the receiver answers with a response
//! frame carrying the same identifier.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Request
// ============================================================================

/// Body of a request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Name of the endpoint that should handle the request.
    pub endpoint: String,

    /// Request payload.
    #[serde(default)]
    pub data: Value,
}

/// A request frame.
///
/// # Format
///
/// ```json
/// { "request": { "id": "uuid", "endpoint": "users.get", "data": { ... } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Request body.
    pub request: RequestBody,
}

impl RequestFrame {
    /// Creates a new request with auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(endpoint: impl Into<String>, data: Value) -> Self {
        Self::with_id(RequestId::generate(), endpoint, data)
    }

    /// Creates a new request with specific ID.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, endpoint: impl Into<String>, data: Value) -> Self {
        Self {
            request: RequestBody {
                id,
                endpoint: endpoint.into(),
                data,
            },
        }
    }

    /// Returns the request identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.request.id
    }
}

// ============================================================================
// ErrorPayload
// ============================================================================

/// Error carried inside a response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// HTTP-like status code.
    pub code: i64,

    /// Human readable message.
    pub message: String,
}

impl ErrorPayload {
    /// Creates a new error payload.
    #[inline]
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        let code = err.code().unwrap_or(crate::error::CODE_HANDLER_FAILURE);
        let message = match err {
            Error::Remote { message, .. } => message.clone(),
            Error::HandlerFailure { message } => message.clone(),
            other => other.to_string(),
        };
        Self { code, message }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Body of a response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Result data (null on error).
    #[serde(default)]
    pub data: Value,

    /// Error payload, absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ResponseBody {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if the response was an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] with the carried code and message.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            None => Ok(self.data),
            Some(ErrorPayload { code, message }) => Err(Error::remote(code, message)),
        }
    }
}

/// A response frame.
///
/// # Format
///
/// Success:
/// ```json
/// { "response": { "id": "uuid", "data": { ... } } }
/// ```
///
/// Error:
/// ```json
/// { "response": { "id": "uuid", "data": null, "error": { "code": 404, "message": "..." } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Response body.
    pub response: ResponseBody,
}

impl ResponseFrame {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn ok(id: RequestId, data: Value) -> Self {
        Self {
            response: ResponseBody {
                id,
                data,
                error: None,
            },
        }
    }

    /// Creates an error response.
    #[inline]
    #[must_use]
    pub fn error(id: RequestId, error: ErrorPayload) -> Self {
        Self {
            response: ResponseBody {
                id,
                data: Value::Null,
                error: Some(error),
            },
        }
    }

    /// Creates a response from a handler outcome.
    #[inline]
    #[must_use]
    pub fn from_result(id: RequestId, result: std::result::Result<Value, ErrorPayload>) -> Self {
        match result {
            Ok(data) => Self::ok(id, data),
            Err(error) => Self::error(id, error),
        }
    }

    /// Returns the response identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.response.id
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
    fn test_request_serialization() {
        let frame = RequestFrame::with_id(RequestId::new("r-1"), "users.get", json!({ "id": 7 }));
        let json = serde_json::to_string(&frame).expect("serialize");

        assert_eq!(
            json,
            r#"{"request":{"id":"r-1","endpoint":"users.get","data":{"id":7}}}"#
        );
    }

    #[test]
    fn test_request_generates_id() {
        let a = RequestFrame::new("x", Value::Null);
        let b = RequestFrame::new("x", Value::Null);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_success_response_omits_error() {
        let frame = ResponseFrame::ok(RequestId::new("r-2"), json!("done"));
        let json = serde_json::to_string(&frame).expect("serialize");

        assert_eq!(json, r#"{"response":{"id":"r-2","data":"done"}}"#);
    }

    #[test]
    fn test_error_response_shape() {
        let frame = ResponseFrame::error(RequestId::new("r-3"), ErrorPayload::new(404, "nope"));
        let value = serde_json::to_value(&frame).expect("serialize");

        assert_eq!(value["response"]["id"], "r-3");
        assert_eq!(value["response"]["data"], Value::Null);
        assert_eq!(value["response"]["error"]["code"], 404);
        assert_eq!(value["response"]["error"]["message"], "nope");
    }

    #[test]
    fn test_into_result_success() {
        let body: ResponseBody =
            serde_json::from_str(r#"{"id":"a","data":{"value":42}}"#).expect("parse");
        let value = body.into_result().expect("should succeed");
        assert_eq!(value["value"], 42);
    }

    #[test]
    fn test_into_result_error() {
        let body: ResponseBody = serde_json::from_str(
            r#"{"id":"a","error":{"code":500,"message":"handler exploded"}}"#,
        )
        .expect("parse");

        assert!(body.is_error());
        match body.into_result() {
            Err(Error::Remote { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "handler exploded");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_null_error_is_success() {
        let body: ResponseBody =
            serde_json::from_str(r#"{"id":"a","data":1,"error":null}"#).expect("parse");
        assert!(!body.is_error());
    }

    #[test]
    fn test_error_payload_from_error() {
        let payload = ErrorPayload::from(&Error::endpoint_not_found("users.delete"));
        assert_eq!(payload.code, 404);
        assert!(payload.message.contains("users.delete"));

        let payload = ErrorPayload::from(&Error::handler_failure("db down"));
        assert_eq!(payload, ErrorPayload::new(500, "db down"));
    }
}
