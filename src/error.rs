//! Error types for the session client.
//!
//! This module defines all error types used throughout the crate.
//! Variants that travel on the wire carry an HTTP-like status code,
//! available through [`Error::code`].
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use socket_session::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let user = client.request("users.get", serde_json::json!({ "id": 7 })).await?;
//!     client.emit("users.seen", user)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::ManualDisconnect`], [`Error::SessionClosed`] |
//! | Request | [`Error::RequestTimeout`], [`Error::Remote`] |
//! | Gateway | [`Error::EndpointNotFound`], [`Error::HandlerFailure`], [`Error::DuplicateRegistration`] |
//! | Protocol | [`Error::MalformedFrame`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Status Codes
// ============================================================================

/// Code for requests attempted after a manual disconnect.
pub const CODE_MANUAL_DISCONNECT: i64 = 400;

/// Code for inbound requests with no registered endpoint.
pub const CODE_ENDPOINT_NOT_FOUND: i64 = 404;

/// Code for requests whose deadline expired.
pub const CODE_TIMEOUT: i64 = 408;

/// Code for failures raised by an inbound request handler.
pub const CODE_HANDLER_FAILURE: i64 = 500;

/// Code for requests failed by a closed connection.
pub const CODE_CONNECTION_CLOSED: i64 = 503;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by [`ClientBuilder::build`](crate::ClientBuilder::build) when
    /// the configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The connection address could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The transport failed to connect or send.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The channel is not open, or closed while the request was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The client was disconnected on purpose and has not been resumed.
    #[error("Client is manually disconnected")]
    ManualDisconnect,

    /// The session task has stopped (all client handles dropped).
    #[error("Session stopped")]
    SessionClosed,

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// No response arrived before the request deadline.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The peer answered with an error payload.
    #[error("Remote error {code}: {message}")]
    Remote {
        /// Status code sent by the peer.
        code: i64,
        /// Message sent by the peer.
        message: String,
    },

    // ========================================================================
    // Gateway Errors
    // ========================================================================
    /// No inbound handler is registered for the endpoint.
    #[error("Endpoint not found: {endpoint}")]
    EndpointNotFound {
        /// The endpoint that was requested.
        endpoint: String,
    },

    /// An inbound request handler failed or panicked.
    #[error("Handler failure: {message}")]
    HandlerFailure {
        /// Description of the failure.
        message: String,
    },

    /// An endpoint handler is already registered under this name.
    #[error("Endpoint already registered: {endpoint}")]
    DuplicateRegistration {
        /// The endpoint name.
        endpoint: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// An inbound frame could not be parsed or classified.
    ///
    /// Logged and dropped by the session; never returned to callers.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the parse failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

impl From<RecvError> for Error {
    fn from(_: RecvError) -> Self {
        Self::SessionClosed
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a remote error from a response error payload.
    #[inline]
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    /// Creates an endpoint not found error.
    #[inline]
    pub fn endpoint_not_found(endpoint: impl Into<String>) -> Self {
        Self::EndpointNotFound {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a handler failure error.
    #[inline]
    pub fn handler_failure(message: impl Into<String>) -> Self {
        Self::HandlerFailure {
            message: message.into(),
        }
    }

    /// Creates a duplicate registration error.
    #[inline]
    pub fn duplicate_registration(endpoint: impl Into<String>) -> Self {
        Self::DuplicateRegistration {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a malformed frame error.
    #[inline]
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the wire status code for this error, if it has one.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::ConnectionClosed => Some(CODE_CONNECTION_CLOSED),
            Self::RequestTimeout { .. } => Some(CODE_TIMEOUT),
            Self::EndpointNotFound { .. } => Some(CODE_ENDPOINT_NOT_FOUND),
            Self::HandlerFailure { .. } => Some(CODE_HANDLER_FAILURE),
            Self::ManualDisconnect => Some(CODE_MANUAL_DISCONNECT),
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::ManualDisconnect
                | Self::SessionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error may succeed on retry.
    ///
    /// A manual disconnect is not recoverable until the caller resumes.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::RequestTimeout { .. } | Self::Connection { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
