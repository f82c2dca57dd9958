//! Session core.
//!
//! One tokio task per client owns the connection state machine, the pending
//! request table and the outbound event queue. Everything that can change
//! them (caller actions, transport callbacks, timer expiries) arrives as a
//! [`SessionCommand`] in a single mailbox and is handled to completion
//! before the next one.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `actor` | Mailbox loop and lifecycle transitions |
//! | `backoff` | Exponential reconnection delay |
//! | `correlator` | Pending request table |
//! | `dispatcher` | Single-handler event registry |
//! | `gateway` | Server-initiated request handling |
//! | `queue` | Outbound events buffered while offline |
//! | `state` | Connection phase enum |

// ============================================================================
// Submodules
// ============================================================================

pub(crate) mod actor;
pub(crate) mod backoff;
pub(crate) mod correlator;
pub(crate) mod dispatcher;
pub(crate) mod gateway;
pub(crate) mod queue;
pub(crate) mod state;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::identifiers::{Generation, RequestId};
use crate::protocol::ResponseFrame;
use crate::transport::TransportEvent;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::EventHandler;
pub use gateway::{HandlerResult, RequestHandler, Responder};

// ============================================================================
// ConnectionState
// ============================================================================

/// Externally observable connection state.
///
/// A scheduled reconnection shows as `Closed` until the retry starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Transport handshake in progress.
    Connecting,
    /// Frames flow in both directions.
    Open,
    /// Channel is down.
    Closed,
}

// ============================================================================
// SessionEvent
// ============================================================================

/// Channel-health notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// The peer acknowledged the session.
    Connect,
    /// The channel closed.
    Disconnect,
    /// The channel reopened after `attempts` automatic retries.
    Reconnect {
        /// Retries needed before the open succeeded.
        attempts: u32,
    },
    /// Automatic retries are exhausted. `resume()` can still reconnect.
    ReconnectFailed,
}

// ============================================================================
// SessionCommand
// ============================================================================

/// Message processed by the session task.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    /// Connect or resume.
    Connect,
    /// Manual disconnect.
    Disconnect,
    /// Fire-and-forget event.
    Emit { event: String, data: Value },
    /// Correlated request.
    Request {
        endpoint: String,
        data: Value,
        timeout: Duration,
        reply: oneshot::Sender<Result<Value>>,
    },
    /// Response produced by an inbound request handler.
    Respond(ResponseFrame),
    /// Request deadline elapsed.
    Expire(RequestId),
    /// Backoff delay elapsed. Carries the generation that was current when
    /// the retry was armed.
    Retry(Generation),
    /// Callback from a transport.
    Transport {
        generation: Generation,
        event: TransportEvent,
    },
    /// Query the pending request count.
    PendingCount(oneshot::Sender<usize>),
    /// Stop the session task.
    Shutdown,
}
