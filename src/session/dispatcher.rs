//! Single-handler event registry.
//!
//! Each event name maps to at most one handler; registering again replaces
//! the previous one. This mirrors a single-slot callback table rather than a
//! multi-subscriber bus.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, error, trace};

use crate::protocol::EventFrame;

use super::gateway::panic_message;

/// Event handler callback type.
///
/// Called on the session task with the event payload.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Dispatcher {
    handlers: RwLock<FxHashMap<String, EventHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`. Returns `true` if one was replaced.
    pub fn on(&self, event: impl Into<String>, handler: EventHandler) -> bool {
        let event = event.into();
        let replaced = self.handlers.write().insert(event.clone(), handler).is_some();
        if replaced {
            debug!(%event, "Event handler replaced");
        }
        replaced
    }

    /// Removes the handler for `event`. Returns `true` if one was present.
    pub fn off(&self, event: &str) -> bool {
        self.handlers.write().remove(event).is_some()
    }

    /// Delivers an inbound event. Returns `true` if a handler ran.
    ///
    /// A panicking handler is logged and does not take the session down.
    pub fn dispatch(&self, frame: EventFrame) -> bool {
        let handler = self.handlers.read().get(&frame.event).cloned();
        let Some(handler) = handler else {
            trace!(event = %frame.event, "No handler for event");
            return false;
        };

        let EventFrame { event, data } = frame;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(data))) {
            error!(%event, panic = %panic_message(panic.as_ref()), "Event handler panicked");
        }
        true
    }
}
