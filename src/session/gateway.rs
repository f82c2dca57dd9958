//! Server-initiated request handling.
//!
//! Inbound request frames are only looked at while the authorization flag is
//! set. Unauthorized frames are dropped without an answer so the peer cannot
//! probe for registered endpoints.
//!
//! # Handler Contract
//!
//! A handler receives the payload and a [`Responder`]. The responder is
//! consumed when used, so at most one response leaves per request. It may be
//! moved into a spawned task to answer later.
//!
//! | Handler outcome | Response sent |
//! |-----------------|---------------|
//! | calls `responder.ok(..)` / `.err(..)` | that response |
//! | returns `Err` before responding | error 500 with the error text |
//! | panics before responding | error 500 with the panic message |
//! | fails after responding | nothing more, warning logged |
//! | drops the responder unused | nothing, warning logged |

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{ErrorPayload, RequestBody, ResponseFrame};

use super::SessionCommand;

// ============================================================================
// Types
// ============================================================================

/// Outcome returned by a request handler.
///
/// `Err` is turned into an error response with code 500 unless the handler
/// already responded.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Request handler callback type.
pub type RequestHandler = Arc<dyn Fn(Value, Responder) -> HandlerResult + Send + Sync>;

// ============================================================================
// ResponseSlot
// ============================================================================

/// Shared once-flag guarding the single response of one inbound request.
#[derive(Clone)]
struct ResponseSlot {
    id: RequestId,
    endpoint: Arc<str>,
    outbound: mpsc::UnboundedSender<SessionCommand>,
    responded: Arc<AtomicBool>,
}

impl ResponseSlot {
    /// Sends the response unless one was already sent. Returns `true` if sent.
    fn fill(&self, result: std::result::Result<Value, ErrorPayload>) -> bool {
        if self.responded.swap(true, Ordering::AcqRel) {
            return false;
        }
        let frame = ResponseFrame::from_result(self.id.clone(), result);
        if self.outbound.send(SessionCommand::Respond(frame)).is_err() {
            debug!(id = %self.id, "Session stopped, response dropped");
        }
        true
    }

    fn is_filled(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Single-use continuation answering one inbound request.
pub struct Responder {
    slot: ResponseSlot,
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("id", &self.slot.id)
            .field("endpoint", &self.slot.endpoint)
            .finish_non_exhaustive()
    }
}

impl Responder {
    /// Returns the identifier of the request being answered.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.slot.id
    }

    /// Returns the endpoint the request was addressed to.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.slot.endpoint
    }

    /// Answers with a success payload.
    pub fn ok(self, data: Value) {
        self.respond(Ok(data));
    }

    /// Answers with an error.
    pub fn err(self, code: i64, message: impl Into<String>) {
        self.respond(Err(ErrorPayload::new(code, message)));
    }

    /// Answers with either outcome.
    pub fn respond(self, result: std::result::Result<Value, ErrorPayload>) {
        if !self.slot.fill(result) {
            warn!(
                id = %self.slot.id,
                endpoint = %self.slot.endpoint,
                "Request already answered, second response dropped"
            );
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if !self.slot.is_filled() {
            warn!(
                id = %self.slot.id,
                endpoint = %self.slot.endpoint,
                "Responder dropped without answering"
            );
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// What the gateway did with an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Authorization is off; nothing was sent.
    Dropped,
    /// No handler; a 404 response was sent.
    NotFound,
    /// The handler ran without failing.
    Handled,
    /// The handler failed; a 500 response was sent if none was yet.
    Failed,
}

#[derive(Default)]
pub(crate) struct Gateway {
    handlers: RwLock<FxHashMap<String, RequestHandler>>,
    authorized: AtomicBool,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRegistration`] if the endpoint is taken; the
    /// existing handler stays in place.
    pub fn register(&self, endpoint: impl Into<String>, handler: RequestHandler) -> Result<()> {
        let endpoint = endpoint.into();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&endpoint) {
            return Err(Error::duplicate_registration(endpoint));
        }
        handlers.insert(endpoint, handler);
        Ok(())
    }

    pub fn unregister(&self, endpoint: &str) -> bool {
        self.handlers.write().remove(endpoint).is_some()
    }

    pub fn set_authorized(&self, enabled: bool) {
        self.authorized.store(enabled, Ordering::Release);
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Acquire)
    }

    /// Runs the handler for an inbound request on the calling task.
    pub fn dispatch(
        &self,
        request: RequestBody,
        outbound: &mpsc::UnboundedSender<SessionCommand>,
    ) -> Dispatch {
        if !self.is_authorized() {
            trace!(id = %request.id, "Server requests disabled, dropping request");
            return Dispatch::Dropped;
        }

        let RequestBody { id, endpoint, data } = request;
        let handler = self.handlers.read().get(&endpoint).cloned();

        let slot = ResponseSlot {
            id,
            endpoint: Arc::from(endpoint.as_str()),
            outbound: outbound.clone(),
            responded: Arc::new(AtomicBool::new(false)),
        };

        let Some(handler) = handler else {
            debug!(id = %slot.id, %endpoint, "No handler for endpoint");
            slot.fill(Err(ErrorPayload::from(&Error::endpoint_not_found(endpoint))));
            return Dispatch::NotFound;
        };

        let responder = Responder { slot: slot.clone() };
        let failure = match catch_unwind(AssertUnwindSafe(|| handler(data, responder))) {
            Ok(Ok(())) => return Dispatch::Handled,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        if slot.is_filled() {
            warn!(id = %slot.id, %endpoint, error = %failure, "Handler failed after responding");
        } else {
            debug!(id = %slot.id, %endpoint, error = %failure, "Handler failed");
            slot.fill(Err(ErrorPayload::from(&Error::handler_failure(failure))));
        }
        Dispatch::Failed
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
