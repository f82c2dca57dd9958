//! Session task.
//!
//! Owns the phase, the pending request table and the event queue. Every
//! mutation happens inside [`Session::run`], one mailbox command at a time.
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──connect──► Connecting ──open──► Open
//!                        ▲    │              │
//!                  retry │    └────close─────┤
//!                        │                   ▼
//!                     (backoff) ◄──────── Closed
//! ```
//!
//! A manual `disconnect()` lands in `Closed` with no retry armed. Only a
//! later `connect()`/`resume()` leaves it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};
use url::Url;

use crate::client::ReconnectPolicy;
use crate::error::{Error, Result};
use crate::identifiers::{Generation, RequestId};
use crate::protocol::{EventFrame, Inbound, RequestFrame, ResponseFrame};
use crate::transport::{TransportEvent, TransportFactory, TransportSink};

use super::backoff::Backoff;
use super::correlator::{Correlator, PendingRequest};
use super::dispatcher::Dispatcher;
use super::gateway::Gateway;
use super::queue::{EventQueue, QueuedEvent};
use super::state::{CloseReason, Phase};
use super::{ConnectionState, SessionCommand, SessionEvent};

// ============================================================================
// SessionChannels
// ============================================================================

/// Outward-facing channels of one session.
pub(crate) struct SessionChannels {
    /// Sender side of the session's own mailbox, handed to transports and timers.
    pub mailbox: mpsc::UnboundedSender<SessionCommand>,
    /// Observable connection state.
    pub state: watch::Sender<ConnectionState>,
    /// Lifecycle notifications.
    pub events: broadcast::Sender<SessionEvent>,
}

// ============================================================================
// Session
// ============================================================================

pub(crate) struct Session {
    url: Url,
    factory: Arc<dyn TransportFactory>,
    policy: ReconnectPolicy,
    phase: Phase,
    generation: Generation,
    backoff: Backoff,
    queue: EventQueue,
    correlator: Correlator,
    dispatcher: Arc<Dispatcher>,
    gateway: Arc<Gateway>,
    channels: SessionChannels,
}

impl Session {
    pub fn new(
        url: Url,
        factory: Arc<dyn TransportFactory>,
        policy: ReconnectPolicy,
        dispatcher: Arc<Dispatcher>,
        gateway: Arc<Gateway>,
        channels: SessionChannels,
    ) -> Self {
        Self {
            url,
            factory,
            backoff: Backoff::new(&policy),
            policy,
            phase: Phase::Idle,
            generation: Generation::default(),
            queue: EventQueue::new(),
            correlator: Correlator::new(),
            dispatcher,
            gateway,
            channels,
        }
    }

    /// Processes commands until shutdown.
    pub async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<SessionCommand>) {
        debug!(url = %self.url, "Session started");

        while let Some(command) = mailbox.recv().await {
            if !self.handle(command) {
                debug!("Shutdown command received");
                break;
            }
        }

        self.shutdown();
        debug!("Session terminated");
    }

    /// Handles one command. Returns `false` to stop the loop.
    fn handle(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Connect => self.connect(),
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::Emit { event, data } => self.emit(event, data),
            SessionCommand::Request {
                endpoint,
                data,
                timeout,
                reply,
            } => self.request(endpoint, data, timeout, reply),
            SessionCommand::Respond(frame) => self.respond(&frame),
            SessionCommand::Expire(id) => {
                self.correlator.expire(&id);
            }
            SessionCommand::Retry(generation) => self.retry(generation),
            SessionCommand::Transport { generation, event } => {
                self.on_transport(generation, event);
            }
            SessionCommand::PendingCount(reply) => {
                let _ = reply.send(self.correlator.len());
            }
            SessionCommand::Shutdown => return false,
        }
        true
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts a transport unless one is already live.
    fn connect(&mut self) {
        if self.phase.is_active() {
            trace!(phase = ?self.phase, "Already connecting or open");
            return;
        }
        let manual = self.phase.is_manual();
        self.phase.cancel_retry();
        self.start_transport(manual);
    }

    fn start_transport(&mut self, manual: bool) {
        self.generation = self.generation.next();
        let generation = self.generation;
        let sink = TransportSink::new(generation, self.channels.mailbox.clone());

        debug!(url = %self.url, %generation, manual, "Connecting");

        match self.factory.open(&self.url, sink) {
            Ok(transport) => {
                self.phase = Phase::Connecting {
                    transport,
                    generation,
                    manual,
                };
                self.publish_state();
            }
            Err(e) => {
                warn!(%generation, error = %e, "Transport failed to start");
                self.phase = Phase::Idle;
                self.on_close(manual);
            }
        }
    }

    fn on_transport(&mut self, generation: Generation, event: TransportEvent) {
        if self.phase.generation() != Some(generation) {
            trace!(%generation, ?event, "Stale transport event ignored");
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Close => {
                let manual = self.phase.is_manual();
                self.on_close(manual);
            }
            TransportEvent::Error(message) => {
                warn!(%generation, error = %message, "Transport error");
            }
        }
    }

    fn on_open(&mut self) {
        let (transport, generation) = match std::mem::take(&mut self.phase) {
            Phase::Connecting {
                transport,
                generation,
                ..
            } => (transport, generation),
            other => {
                trace!(phase = ?other, "Open outside connecting phase ignored");
                self.phase = other;
                return;
            }
        };

        self.phase = Phase::Open {
            transport,
            generation,
        };
        let attempts = self.backoff.reset();
        debug!(%generation, attempts, queued = self.queue.len(), "Connection open");

        self.flush_queue();
        self.publish_state();

        if attempts > 0 {
            self.notify(SessionEvent::Reconnect { attempts });
        }
    }

    /// Handles the loss of the live transport.
    fn on_close(&mut self, manual: bool) {
        let was_active = self.phase.is_active();
        drop(std::mem::take(&mut self.phase));

        let failed = self.correlator.fail_all(|| Error::ConnectionClosed);
        debug!(generation = %self.generation, failed, manual, "Connection closed");

        if manual {
            self.phase = Phase::Closed(CloseReason::Manual);
            self.publish_state();
            if was_active {
                self.notify(SessionEvent::Disconnect);
            }
            return;
        }

        let mut exhausted = false;
        let retry = if !self.policy.enabled {
            debug!("Reconnection disabled");
            None
        } else if let Some(delay) = self.backoff.next_delay() {
            Some(self.arm_retry(delay))
        } else {
            warn!(attempts = self.backoff.attempts(), "Reconnection attempts exhausted");
            exhausted = true;
            None
        };

        self.phase = Phase::Closed(CloseReason::Dropped { retry });
        self.publish_state();

        if was_active {
            self.notify(SessionEvent::Disconnect);
        }
        if exhausted {
            self.notify(SessionEvent::ReconnectFailed);
        }
    }

    fn arm_retry(&self, delay: Duration) -> AbortHandle {
        let mailbox = self.channels.mailbox.clone();
        let generation = self.generation;
        debug!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempts() + 1,
            "Reconnect scheduled"
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = mailbox.send(SessionCommand::Retry(generation));
        })
        .abort_handle()
    }

    fn retry(&mut self, generation: Generation) {
        if generation != self.generation || !self.phase.retry_pending() {
            trace!(%generation, "Stale retry ignored");
            return;
        }
        self.phase.cancel_retry();
        self.backoff.record_attempt();
        self.start_transport(false);
    }

    /// Manual disconnect. Drops queued events and stops retrying.
    fn disconnect(&mut self) {
        if matches!(self.phase, Phase::Idle | Phase::Closed(CloseReason::Manual)) {
            trace!(phase = ?self.phase, "Nothing to disconnect");
            return;
        }

        let was_active = self.phase.is_active();
        match std::mem::replace(&mut self.phase, Phase::Closed(CloseReason::Manual)) {
            Phase::Connecting { transport, .. } | Phase::Open { transport, .. } => {
                transport.close();
            }
            Phase::Closed(CloseReason::Dropped {
                retry: Some(timer),
            }) => timer.abort(),
            _ => {}
        }

        let dropped = self.queue.clear();
        let failed = self.correlator.fail_all(|| Error::ConnectionClosed);
        self.backoff.reset();
        debug!(dropped, failed, "Disconnected");

        self.publish_state();
        if was_active {
            self.notify(SessionEvent::Disconnect);
        }
    }

    fn shutdown(&mut self) {
        let was_active = self.phase.is_active();
        match std::mem::replace(&mut self.phase, Phase::Closed(CloseReason::Manual)) {
            Phase::Connecting { transport, .. } | Phase::Open { transport, .. } => {
                transport.close();
            }
            Phase::Closed(CloseReason::Dropped {
                retry: Some(timer),
            }) => timer.abort(),
            _ => {}
        }

        let dropped = self.queue.clear();
        let failed = self.correlator.fail_all(|| Error::ConnectionClosed);
        if dropped > 0 || failed > 0 {
            debug!(dropped, failed, "Abandoned work on shutdown");
        }

        self.publish_state();
        if was_active {
            self.notify(SessionEvent::Disconnect);
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    fn emit(&mut self, event: String, data: Value) {
        if self.phase.is_manual() {
            debug!(%event, "Manually disconnected, event dropped");
            return;
        }

        let frame = EventFrame::new(event, data);

        if let Some(transport) = self.phase.open_transport()
            && self.queue.is_empty()
        {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(event = %frame.event, error = %e, "Failed to encode event");
                    return;
                }
            };
            match transport.send(text) {
                Ok(()) => {
                    trace!(event = %frame.event, "Event sent");
                    return;
                }
                Err(e) => debug!(event = %frame.event, error = %e, "Send failed, queueing event"),
            }
        }

        let seq = self.queue.push(frame.event, frame.data);
        trace!(seq, queued = self.queue.len(), "Event queued");

        // Open with a backlog left by an interrupted flush.
        if matches!(self.phase, Phase::Open { .. }) {
            self.flush_queue();
        }
    }

    /// Sends queued events in enqueue order. Stops at the first failure and
    /// keeps the rest.
    fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let Some(transport) = self.phase.open_transport() else {
            return;
        };

        let mut pending = self.queue.drain().collect::<Vec<_>>().into_iter();
        let mut sent = 0usize;

        while let Some(queued) = pending.next() {
            let frame = EventFrame::new(queued.event.clone(), queued.data.clone());
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(seq = queued.seq, error = %e, "Failed to encode queued event, dropping");
                    continue;
                }
            };

            if let Err(e) = transport.send(text) {
                warn!(seq = queued.seq, error = %e, "Flush interrupted");
                let rest: Vec<QueuedEvent> = std::iter::once(queued).chain(pending).collect();
                for event in rest.into_iter().rev() {
                    self.queue.requeue_front(event);
                }
                break;
            }
            sent += 1;
        }

        debug!(sent, remaining = self.queue.len(), "Queue flushed");
    }

    fn request(
        &mut self,
        endpoint: String,
        data: Value,
        timeout: Duration,
        reply: oneshot::Sender<Result<Value>>,
    ) {
        if self.phase.is_manual() {
            let _ = reply.send(Err(Error::ManualDisconnect));
            return;
        }
        let Some(transport) = self.phase.open_transport() else {
            let _ = reply.send(Err(Error::ConnectionClosed));
            return;
        };

        let frame = RequestFrame::new(endpoint, data);
        let id = frame.id().clone();
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        if let Err(e) = transport.send(text) {
            debug!(%id, error = %e, "Request send failed");
            let _ = reply.send(Err(e));
            return;
        }

        let deadline = arm_deadline(&self.channels.mailbox, id.clone(), timeout);
        trace!(%id, endpoint = %frame.request.endpoint, "Request sent");
        self.correlator.insert(id, PendingRequest::new(reply, deadline, timeout));
    }

    fn respond(&self, frame: &ResponseFrame) {
        let Some(transport) = self.phase.open_transport() else {
            debug!(id = %frame.id(), "Channel not open, response dropped");
            return;
        };

        match serde_json::to_string(frame) {
            Ok(text) => {
                if let Err(e) = transport.send(text) {
                    warn!(id = %frame.id(), error = %e, "Failed to send response");
                }
            }
            Err(e) => warn!(id = %frame.id(), error = %e, "Failed to encode response"),
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    fn on_message(&mut self, text: &str) {
        let inbound = match Inbound::parse(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "Discarding malformed frame");
                return;
            }
        };
        trace!(kind = inbound.kind(), "Inbound frame");

        match inbound {
            Inbound::Request(request) => {
                let outcome = self.gateway.dispatch(request, &self.channels.mailbox);
                trace!(?outcome, "Inbound request handled");
            }
            Inbound::Response(response) => {
                self.correlator.resolve(response);
            }
            Inbound::Handshake(_) => {
                debug!("Handshake acknowledged");
                self.notify(SessionEvent::Connect);
            }
            Inbound::Event(frame) => {
                self.dispatcher.dispatch(frame);
            }
        }
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn publish_state(&self) {
        let state = self.phase.state();
        self.channels.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn notify(&self, event: SessionEvent) {
        trace!(?event, "Session event");
        // No subscribers is fine.
        let _ = self.channels.events.send(event);
    }
}

/// Spawns the deadline timer of one request.
fn arm_deadline(
    mailbox: &mpsc::UnboundedSender<SessionCommand>,
    id: RequestId,
    timeout: Duration,
) -> AbortHandle {
    let mailbox = mailbox.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = mailbox.send(SessionCommand::Expire(id));
    })
    .abort_handle()
}

// ============================================================================
// Tests
// ============================================================================
