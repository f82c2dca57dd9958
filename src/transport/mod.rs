//! Transport layer.
//!
//! The session never talks to a socket directly. It asks a
//! [`TransportFactory`] for a fresh [`Transport`] on every connect attempt
//! and receives the transport's lifecycle callbacks through a
//! [`TransportSink`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   open(url, sink)   ┌──────────────────┐
//! │  Session task    │────────────────────►│ TransportFactory │
//! │                  │                     └────────┬─────────┘
//! │  mailbox ◄───────┼── opened / message ──────────┤
//! │                  │   closed / error     ┌───────▼─────────┐
//! │                  │─── send / close ────►│    Transport    │
//! └──────────────────┘                      └─────────────────┘
//! ```
//!
//! Every sink is tagged with the generation of the transport it belongs to,
//! so late callbacks from a replaced transport are discarded.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process transport driven by hand (tests, simulations) |
//! | `websocket` | WebSocket transport over `tokio-tungstenite` |

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport driven by hand.
pub mod memory;

/// WebSocket transport over `tokio-tungstenite`.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;
use url::Url;

use crate::error::Result;
use crate::identifiers::Generation;
use crate::session::SessionCommand;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryLink, MemoryTransportFactory};
pub use websocket::{WebSocketTransport, WebSocketTransportFactory};

// ============================================================================
// ReadyState
// ============================================================================

/// Readiness of a transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting,
    /// Frames can be sent.
    Open,
    /// Close requested, not yet confirmed.
    Closing,
    /// Channel is gone.
    Closed,
}

impl ReadyState {
    /// Encodes the state for storage in an atomic.
    #[inline]
    #[must_use]
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    /// Decodes a state stored with [`ReadyState::as_u8`].
    #[inline]
    #[must_use]
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle callback raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open and can carry frames.
    Open,
    /// A text frame arrived.
    Message(String),
    /// The channel closed, or failed to open.
    Close,
    /// A non-fatal error worth logging. A fatal error is followed by `Close`.
    Error(String),
}

// ============================================================================
// TransportSink
// ============================================================================

/// Callback endpoint handed to a transport when it is opened.
///
/// Cheap to clone. Calls after the session has stopped are ignored.
#[derive(Clone)]
pub struct TransportSink {
    generation: Generation,
    mailbox: mpsc::UnboundedSender<SessionCommand>,
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl TransportSink {
    /// Creates a sink posting into the session mailbox.
    pub(crate) fn new(generation: Generation, mailbox: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self {
            generation,
            mailbox,
        }
    }

    /// Returns the generation this sink reports for.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Reports that the channel opened.
    pub fn opened(&self) {
        self.post(TransportEvent::Open);
    }

    /// Reports an inbound text frame.
    pub fn message(&self, text: impl Into<String>) {
        self.post(TransportEvent::Message(text.into()));
    }

    /// Reports that the channel closed.
    pub fn closed(&self) {
        self.post(TransportEvent::Close);
    }

    /// Reports a transport error.
    pub fn error(&self, message: impl Into<String>) {
        self.post(TransportEvent::Error(message.into()));
    }

    fn post(&self, event: TransportEvent) {
        let command = SessionCommand::Transport {
            generation: self.generation,
            event,
        };
        if self.mailbox.send(command).is_err() {
            trace!(generation = %self.generation, "Session stopped, transport event dropped");
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// One duplex channel instance.
///
/// Implementations must not block: `send` queues the frame for delivery.
pub trait Transport: Send + Sync {
    /// Queues a text frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if
    /// the channel is not open.
    fn send(&self, frame: String) -> Result<()>;

    /// Requests the channel to close. A `Close` callback follows.
    fn close(&self);

    /// Returns the current readiness.
    fn ready_state(&self) -> ReadyState;
}

/// Creates transports for the session.
///
/// Injected at construction; the session has no knowledge of the concrete
/// channel in use.
pub trait TransportFactory: Send + Sync + 'static {
    /// Starts a new transport towards `url`.
    ///
    /// The transport must report `opened` or `closed` through `sink`
    /// eventually.
    ///
    /// # Errors
    ///
    /// An error is treated like an immediate close of the new transport.
    fn open(&self, url: &Url, sink: TransportSink) -> Result<Box<dyn Transport>>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_round_trip() {
        for state in [
            ReadyState::Connecting,
            ReadyState::Open,
            ReadyState::Closing,
            ReadyState::Closed,
        ] {
            assert_eq!(ReadyState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_sink_posts_tagged_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let generation = Generation::default().next();
        let sink = TransportSink::new(generation, tx);

        sink.opened();
        sink.message("hello");

        match rx.try_recv().expect("open event") {
            SessionCommand::Transport { generation: g, event } => {
                assert_eq!(g, generation);
                assert_eq!(event, TransportEvent::Open);
            }
            _ => panic!("unexpected command"),
        }
        match rx.try_recv().expect("message event") {
            SessionCommand::Transport { event, .. } => {
                assert_eq!(event, TransportEvent::Message("hello".into()));
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn test_sink_after_session_stopped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = TransportSink::new(Generation::default(), tx);
        // Must not panic.
        sink.closed();
    }
}
