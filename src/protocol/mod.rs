//! Wire protocol frame types.
//!
//! Frames are newline-free JSON text messages in one of three disjoint shapes.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `EventFrame` | both | Fire-and-forget notification |
//! | `RequestFrame` | both | Correlated request |
//! | `ResponseFrame` | both | Answer to a request, same `id` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Event frame and reserved event names |
//! | `inbound` | Classification of received frames |
//! | `request` | Request and Response frames |

// ============================================================================
// Submodules
// ============================================================================

/// Event frame types.
pub mod event;

/// Inbound frame classification.
pub mod inbound;

/// Request and Response frame types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{EventFrame, HANDSHAKE_EVENT};
pub use inbound::Inbound;
pub use request::{ErrorPayload, RequestBody, RequestFrame, ResponseBody, ResponseFrame};
