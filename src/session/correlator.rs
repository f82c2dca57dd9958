//! Pending request table.
//!
//! Each entry is settled exactly once: by its response, by its deadline, or
//! by the channel closing. Settling removes the entry and aborts its
//! deadline timer, so whichever outcome comes second finds nothing to do.

use std::time::Duration;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::ResponseBody;

/// An outbound request awaiting its response.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    reply: oneshot::Sender<Result<Value>>,
    deadline: AbortHandle,
    timeout: Duration,
}

impl PendingRequest {
    pub fn new(reply: oneshot::Sender<Result<Value>>, deadline: AbortHandle, timeout: Duration) -> Self {
        Self {
            reply,
            deadline,
            timeout,
        }
    }

    fn settle(self, outcome: Result<Value>) {
        self.deadline.abort();
        if self.reply.send(outcome).is_err() {
            trace!("Requester went away before settlement");
        }
    }
}

/// Map of request IDs to their continuations.
#[derive(Debug, Default)]
pub(crate) struct Correlator {
    pending: FxHashMap<RequestId, PendingRequest>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: RequestId, request: PendingRequest) {
        if let Some(previous) = self.pending.insert(id.clone(), request) {
            // Identifiers are UUIDs; a clash means a broken generator.
            warn!(%id, "Duplicate request id, failing the older request");
            previous.settle(Err(Error::connection(format!("request id {id} reused"))));
        }
    }

    /// Settles the matching request. Returns `false` for unknown ids.
    pub fn resolve(&mut self, response: ResponseBody) -> bool {
        let Some(request) = self.pending.remove(&response.id) else {
            debug!(id = %response.id, "Response for unknown request");
            return false;
        };
        trace!(id = %response.id, error = response.is_error(), "Response matched");
        request.settle(response.into_result());
        true
    }

    /// Fails the request with a timeout. Returns `false` if already settled.
    pub fn expire(&mut self, id: &RequestId) -> bool {
        let Some(request) = self.pending.remove(id) else {
            return false;
        };
        let timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX);
        debug!(%id, timeout_ms, "Request timed out");
        request.settle(Err(Error::request_timeout(id.clone(), timeout_ms)));
        true
    }

    /// Fails every pending request. Returns how many were failed.
    pub fn fail_all(&mut self, error: impl Fn() -> Error) -> usize {
        let count = self.pending.len();
        for (_, request) in self.pending.drain() {
            request.settle(Err(error()));
        }
        if count > 0 {
            debug!(count, "Failed pending requests");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
