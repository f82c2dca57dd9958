//! Public client API.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Cheap-to-clone handle to one session |
//! | [`ClientBuilder`] | Address and behavior configuration |
//! | [`ReconnectPolicy`] | Exponential backoff settings |

// ============================================================================
// Submodules
// ============================================================================

/// Connection address assembly.
mod address;

/// Fluent builder for client configuration.
pub mod builder;

/// Client handle.
pub mod core;

/// Reconnection policy.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ClientBuilder, DEFAULT_REQUEST_TIMEOUT};
pub use core::Client;
pub use options::ReconnectPolicy;
