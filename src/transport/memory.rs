//! In-process transport driven by hand.
//!
//! [`MemoryTransportFactory`] records every transport the session opens as a
//! [`MemoryLink`]. The test (or simulation) then plays the peer: it decides
//! when the link opens, pushes inbound frames and closes it, and inspects the
//! frames the session sent.
//!
//! # Example
//!
//! ```ignore
//! let factory = MemoryTransportFactory::new();
//! let client = Client::builder("ws://127.0.0.1:9000")
//!     .transport(factory.clone())
//!     .build()?;
//!
//! let link = factory.last().expect("connect attempt");
//! link.open();
//! link.push(r#"{"event":"greeting","data":"hi"}"#);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::Generation;

use super::{ReadyState, Transport, TransportFactory, TransportSink};

// ============================================================================
// MemoryTransportFactory
// ============================================================================

/// Factory producing hand-driven transports.
#[derive(Clone, Default)]
pub struct MemoryTransportFactory {
    links: Arc<Mutex<Vec<MemoryLink>>>,
}

impl fmt::Debug for MemoryTransportFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransportFactory")
            .field("opened", &self.opened())
            .finish()
    }
}

impl MemoryTransportFactory {
    /// Creates an empty factory.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many transports have been opened.
    #[inline]
    #[must_use]
    pub fn opened(&self) -> usize {
        self.links.lock().len()
    }

    /// Returns the most recently opened link.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<MemoryLink> {
        self.links.lock().last().cloned()
    }

    /// Returns every link opened so far, oldest first.
    #[must_use]
    pub fn links(&self) -> Vec<MemoryLink> {
        self.links.lock().clone()
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn open(&self, url: &Url, sink: TransportSink) -> Result<Box<dyn Transport>> {
        let link = MemoryLink::new(url.clone(), sink);
        self.links.lock().push(link.clone());
        Ok(Box::new(MemoryTransport { link }))
    }
}

// ============================================================================
// MemoryLink
// ============================================================================

struct LinkState {
    ready: ReadyState,
    sent: Vec<String>,
    close_requested: bool,
}

/// The peer side of one in-memory transport.
#[derive(Clone)]
pub struct MemoryLink {
    url: Url,
    sink: TransportSink,
    state: Arc<Mutex<LinkState>>,
}

impl fmt::Debug for MemoryLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryLink")
            .field("generation", &self.sink.generation())
            .field("ready", &state.ready)
            .field("sent", &state.sent.len())
            .finish()
    }
}

impl MemoryLink {
    fn new(url: Url, sink: TransportSink) -> Self {
        Self {
            url,
            sink,
            state: Arc::new(Mutex::new(LinkState {
                ready: ReadyState::Connecting,
                sent: Vec::new(),
                close_requested: false,
            })),
        }
    }

    /// Returns the URL the session connected to.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the generation of this transport.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.sink.generation()
    }

    /// Completes the handshake and reports `open`.
    pub fn open(&self) {
        self.state.lock().ready = ReadyState::Open;
        self.sink.opened();
    }

    /// Delivers an inbound text frame.
    pub fn push(&self, text: impl Into<String>) {
        self.sink.message(text);
    }

    /// Reports a transport error without closing.
    pub fn fail(&self, message: impl Into<String>) {
        self.sink.error(message);
    }

    /// Drops the channel from the peer side and reports `close`.
    pub fn close(&self) {
        self.state.lock().ready = ReadyState::Closed;
        self.sink.closed();
    }

    /// Returns the frames sent by the session, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Returns the sent frames parsed as JSON.
    #[must_use]
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Returns `true` if the session asked this transport to close.
    #[inline]
    #[must_use]
    pub fn close_requested(&self) -> bool {
        self.state.lock().close_requested
    }

    /// Returns the current readiness.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.state.lock().ready
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Session side of a [`MemoryLink`].
struct MemoryTransport {
    link: MemoryLink,
}

impl Transport for MemoryTransport {
    fn send(&self, frame: String) -> Result<()> {
        let mut state = self.link.state.lock();
        if state.ready != ReadyState::Open {
            return Err(Error::ConnectionClosed);
        }
        state.sent.push(frame);
        Ok(())
    }

    fn close(&self) {
        let mut state = self.link.state.lock();
        state.close_requested = true;
        if state.ready != ReadyState::Closed {
            state.ready = ReadyState::Closing;
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.link.state.lock().ready
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    fn factory_with_link() -> (MemoryTransportFactory, Box<dyn Transport>, MemoryLink) {
        let factory = MemoryTransportFactory::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let url = Url::parse("ws://localhost:1").expect("url");
        let transport = factory
            .open(&url, TransportSink::new(Generation::default(), tx))
            .expect("open");
        let link = factory.last().expect("link recorded");
        (factory, transport, link)
    }

    #[test]
    fn test_send_requires_open() {
        let (_factory, transport, link) = factory_with_link();

        assert!(transport.send("early".into()).is_err());
        link.open();
        transport.send("later".into()).expect("send");
        assert_eq!(link.sent(), vec!["later".to_string()]);
    }

    #[test]
    fn test_close_is_recorded() {
        let (factory, transport, link) = factory_with_link();
        link.open();

        transport.close();
        assert!(link.close_requested());
        assert_eq!(transport.ready_state(), ReadyState::Closing);
        assert_eq!(factory.opened(), 1);
    }

    #[test]
    fn test_sent_json_skips_invalid() {
        let (_factory, transport, link) = factory_with_link();
        link.open();
        transport.send(r#"{"event":"a"}"#.into()).expect("send");
        transport.send("not json".into()).expect("send");

        let frames = link.sent_json();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "a");
    }
}
