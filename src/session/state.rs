//! Connection phase.
//!
//! The phase owns the live transport, so a transport can only exist while
//! the session is connecting or open. Closing always means replacing the
//! phase, which drops the transport with it.

use std::fmt;

use tokio::task::AbortHandle;

use crate::identifiers::Generation;
use crate::transport::Transport;

use super::ConnectionState;

/// Why the channel is down.
#[derive(Debug)]
pub(crate) enum CloseReason {
    /// Lost without being asked to. `retry` is the pending backoff timer,
    /// `None` when retries are disabled or exhausted.
    Dropped { retry: Option<AbortHandle> },
    /// Closed by `disconnect()`. Nothing is retried and emits are dropped
    /// until the next successful open.
    Manual,
}

/// Session-internal connection phase.
#[derive(Default)]
pub(crate) enum Phase {
    #[default]
    Idle,
    Connecting {
        transport: Box<dyn Transport>,
        generation: Generation,
        /// Started by `resume()` after a manual disconnect.
        manual: bool,
    },
    Open {
        transport: Box<dyn Transport>,
        generation: Generation,
    },
    Closed(CloseReason),
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Connecting {
                generation, manual, ..
            } => f
                .debug_struct("Connecting")
                .field("generation", generation)
                .field("manual", manual)
                .finish_non_exhaustive(),
            Self::Open { generation, .. } => f
                .debug_struct("Open")
                .field("generation", generation)
                .finish_non_exhaustive(),
            Self::Closed(reason) => f.debug_tuple("Closed").field(reason).finish(),
        }
    }
}

impl Phase {
    /// Observable state for this phase.
    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Idle => ConnectionState::Idle,
            Self::Connecting { .. } => ConnectionState::Connecting,
            Self::Open { .. } => ConnectionState::Open,
            Self::Closed(_) => ConnectionState::Closed,
        }
    }

    /// Returns `true` while a manual disconnect is in effect.
    pub fn is_manual(&self) -> bool {
        matches!(
            self,
            Self::Closed(CloseReason::Manual) | Self::Connecting { manual: true, .. }
        )
    }

    /// Returns `true` while a transport is live.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting { .. } | Self::Open { .. })
    }

    /// Generation of the live transport, if any.
    pub fn generation(&self) -> Option<Generation> {
        match self {
            Self::Connecting { generation, .. } | Self::Open { generation, .. } => Some(*generation),
            _ => None,
        }
    }

    /// The transport, only once it is open.
    pub fn open_transport(&self) -> Option<&dyn Transport> {
        match self {
            Self::Open { transport, .. } => Some(transport.as_ref()),
            _ => None,
        }
    }

    /// Cancels a pending retry timer, if any.
    pub fn cancel_retry(&mut self) {
        if let Self::Closed(CloseReason::Dropped { retry }) = self
            && let Some(timer) = retry.take()
        {
            timer.abort();
        }
    }

    /// Returns `true` if a retry timer is armed.
    pub fn retry_pending(&self) -> bool {
        matches!(self, Self::Closed(CloseReason::Dropped { retry: Some(_) }))
    }
}
