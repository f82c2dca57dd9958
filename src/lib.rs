//! Resilient session layer over a duplex WebSocket channel.
//!
//! This library turns one bidirectional text channel into three facilities:
//!
//! - **Events**: fire-and-forget messages, queued while offline
//! - **Requests**: correlated request/response with per-request timeouts
//! - **Lifecycle**: automatic reconnection with exponential backoff and
//!   replay of queued events
//!
//! It also answers requests initiated by the server, when explicitly allowed.
//!
//! # Architecture
//!
//! Each [`Client`] owns one session task. Caller actions, transport callbacks
//! and timer expiries all go through that task's mailbox, so the connection
//! state, the pending request table and the event queue are only ever
//! touched by one task at a time.
//!
//! Key design principles:
//!
//! - A fresh transport per connect attempt, tagged with a generation
//! - Requests settle exactly once: response, timeout or close
//! - Events are queued during automatic disconnects and dropped after a
//!   manual one
//! - Server requests are silently ignored until authorized
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use socket_session::{Client, ConnectionState, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder("ws://127.0.0.1:9000")
//!         .path("socket")
//!         .query("token", "secret")
//!         .build()?;
//!
//!     client.on("notice", |data| println!("notice: {data}"));
//!     client.wait_for_state(ConnectionState::Open).await?;
//!
//!     client.emit("join", json!({"room": "lobby"}))?;
//!     let members = client.request("room.members", json!({"room": "lobby"})).await?;
//!     println!("members: {members}");
//!
//!     client.disconnect()?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], [`ClientBuilder`], [`ReconnectPolicy`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Request and transport identifiers |
//! | [`protocol`] | Wire frames and inbound classification |
//! | [`session`] | Lifecycle states, notifications, handler types |
//! | [`transport`] | Transport traits, WebSocket and in-memory transports |
//!
//! # Wire Format
//!
//! | Frame | Shape |
//! |-------|-------|
//! | Event | `{"event": name, "data": any}` |
//! | Request | `{"request": {"id", "endpoint", "data"}}` |
//! | Response | `{"response": {"id", "data", "error"?: {"code", "message"}}}` |

// ============================================================================
// Modules
// ============================================================================

pub mod client;
pub mod error;
pub mod identifiers;
pub mod protocol;
pub mod session;
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client
pub use client::{Client, ClientBuilder, ReconnectPolicy};

// Error types
pub use error::{Error, Result};

// Identifiers
pub use identifiers::{Generation, RequestId};

// Protocol
pub use protocol::{ErrorPayload, HANDSHAKE_EVENT};

// Session
pub use session::{
    ConnectionState, EventHandler, HandlerResult, RequestHandler, Responder, SessionEvent,
};

// Transport
pub use transport::{
    MemoryLink, MemoryTransportFactory, ReadyState, Transport, TransportEvent, TransportFactory,
    TransportSink, WebSocketTransportFactory,
};
