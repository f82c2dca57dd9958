//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each [`WebSocketTransport`] spawns one tokio task that connects, then
//! pumps frames in both directions until either side closes.
//!
//! # Event Loop
//!
//! - Incoming text frames are forwarded to the sink
//! - Outgoing frames arrive over an unbounded command channel
//! - Binary, ping and pong frames are ignored
//! - The sink always receives exactly one `closed` when the task ends

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{ReadyState, Transport, TransportFactory, TransportSink};

// ============================================================================
// TransportCommand
// ============================================================================

/// Internal commands for the event loop.
enum TransportCommand {
    /// Write a text frame.
    Send(String),
    /// Close the socket.
    Close,
}

// ============================================================================
// WebSocketTransportFactory
// ============================================================================

/// Default [`TransportFactory`] opening a WebSocket per connect attempt.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransportFactory;

impl TransportFactory for WebSocketTransportFactory {
    fn open(&self, url: &Url, sink: TransportSink) -> Result<Box<dyn Transport>> {
        Ok(Box::new(WebSocketTransport::spawn(url.clone(), sink)))
    }
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// A single WebSocket connection.
///
/// Dropping the handle closes the socket.
pub struct WebSocketTransport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// Readiness shared with the event loop.
    ready: Arc<AtomicU8>,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Spawns the event loop and returns its handle.
    pub fn spawn(url: Url, sink: TransportSink) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicU8::new(ReadyState::Connecting.as_u8()));

        tokio::spawn(Self::run_event_loop(
            url,
            command_rx,
            sink,
            Arc::clone(&ready),
        ));

        Self { command_tx, ready }
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        url: Url,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
        sink: TransportSink,
        ready: Arc<AtomicU8>,
    ) {
        let generation = sink.generation();

        // Connect, unless the handle is closed or dropped first
        let connected = tokio::select! {
            result = connect_async(url.as_str()) => Some(result),
            () = Self::wait_for_close(&mut command_rx) => None,
        };

        let ws_stream = match connected {
            Some(Ok((ws_stream, response))) => {
                debug!(%generation, status = %response.status(), %url, "WebSocket connected");
                ws_stream
            }
            Some(Err(e)) => {
                warn!(%generation, error = %e, %url, "WebSocket connect failed");
                sink.error(e.to_string());
                Self::finish(&ready, &sink);
                return;
            }
            None => {
                debug!(%generation, "Close requested before connect completed");
                Self::finish(&ready, &sink);
                return;
            }
        };

        ready.store(ReadyState::Open.as_u8(), Ordering::Release);
        sink.opened();

        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            sink.message(text.as_str());
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(%generation, ?frame, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(%generation, error = %e, "WebSocket error");
                            sink.error(e.to_string());
                            break;
                        }

                        None => {
                            debug!(%generation, "WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        Some(Ok(_)) => {}
                    }
                }

                // Commands from the session
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(frame)) => {
                            trace!(%generation, len = frame.len(), "Frame sent");
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                warn!(%generation, error = %e, "Failed to send frame");
                                sink.error(e.to_string());
                                break;
                            }
                        }

                        Some(TransportCommand::Close) | None => {
                            debug!(%generation, "Closing WebSocket");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        Self::finish(&ready, &sink);
        debug!(%generation, "Event loop terminated");
    }

    /// Resolves once a close is requested or the handle is dropped.
    async fn wait_for_close(command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>) {
        loop {
            match command_rx.recv().await {
                Some(TransportCommand::Close) | None => return,
                Some(TransportCommand::Send(_)) => {
                    trace!("Dropping frame sent before open");
                }
            }
        }
    }

    fn finish(ready: &AtomicU8, sink: &TransportSink) {
        ready.store(ReadyState::Closed.as_u8(), Ordering::Release);
        sink.closed();
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, frame: String) -> Result<()> {
        if self.ready_state() != ReadyState::Open {
            return Err(Error::ConnectionClosed);
        }
        self.command_tx
            .send(TransportCommand::Send(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self.ready.compare_exchange(
            ReadyState::Open.as_u8(),
            ReadyState::Closing.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.command_tx.send(TransportCommand::Close);
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        // Replaced transports must not linger.
        let _ = self.command_tx.send(TransportCommand::Close);
    }
}

// ============================================================================
// Tests
// ============================================================================
