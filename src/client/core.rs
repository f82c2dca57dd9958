//! Client handle.
//!
//! A [`Client`] forwards every action to its session task and never touches
//! connection state directly. Clones share the same session; dropping the
//! last clone shuts it down.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use socket_session::{Client, SessionEvent};
//!
//! # async fn example() -> socket_session::Result<()> {
//! let client = Client::builder("ws://127.0.0.1:9000").path("socket").build()?;
//! let mut events = client.subscribe();
//!
//! client.on("chat", |data| println!("chat: {data}"));
//! client.emit("chat", json!({"text": "hello"}))?;
//!
//! while let Ok(event) = events.recv().await {
//!     if event == SessionEvent::Connect {
//!         let rooms = client.request("rooms.list", json!({})).await?;
//!         println!("rooms: {rooms}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::session::dispatcher::Dispatcher;
use crate::session::gateway::Gateway;
use crate::session::{ConnectionState, HandlerResult, Responder, SessionCommand, SessionEvent};

use super::builder::ClientBuilder;

// ============================================================================
// ClientInner
// ============================================================================

/// State shared by every clone of a [`Client`].
pub(crate) struct ClientInner {
    /// Connection URL.
    pub url: Url,
    /// Whether the URL is secure or loopback.
    pub trusted: bool,
    /// Default request timeout.
    pub request_timeout: Duration,
    /// Session mailbox.
    pub mailbox: mpsc::UnboundedSender<SessionCommand>,
    /// Event handler registry, shared with the session.
    pub dispatcher: Arc<Dispatcher>,
    /// Request handler registry and authorization flag, shared with the session.
    pub gateway: Arc<Gateway>,
    /// Observable connection state.
    pub state: watch::Receiver<ConnectionState>,
    /// Lifecycle notifications.
    pub events: broadcast::Sender<SessionEvent>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        debug!(url = %self.url, "Last client handle dropped, shutting session down");
        let _ = self.mailbox.send(SessionCommand::Shutdown);
    }
}

// ============================================================================
// Client
// ============================================================================

/// Handle to one resilient session.
///
/// Cheap to clone. All methods are non-blocking except the request family,
/// which wait for the response.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .field("server_requests", &self.server_requests_enabled())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Creates a configuration builder for the given base address.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use socket_session::Client;
    ///
    /// # async fn example() -> socket_session::Result<()> {
    /// let client = Client::builder("wss://example.com").path("socket").build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[inline]
    #[must_use]
    pub fn builder(base: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base)
    }

    pub(crate) fn from_inner(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

// ============================================================================
// Client - Lifecycle
// ============================================================================

impl Client {
    /// Starts connecting. No-op while connecting or open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session task has stopped.
    pub fn connect(&self) -> Result<()> {
        self.post(SessionCommand::Connect)
    }

    /// Reconnects after a manual disconnect or exhausted retries.
    ///
    /// No-op while connecting or open. Requests keep failing with
    /// [`Error::ManualDisconnect`] until the new connection opens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session task has stopped.
    pub fn resume(&self) -> Result<()> {
        self.post(SessionCommand::Connect)
    }

    /// Closes the connection and stops retrying.
    ///
    /// Queued events are dropped and pending requests fail with
    /// [`Error::ConnectionClosed`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session task has stopped.
    pub fn disconnect(&self) -> Result<()> {
        self.post(SessionCommand::Disconnect)
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Returns a receiver that observes state changes.
    #[inline]
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Waits until the connection reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session stops first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.inner.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map_err(|_| Error::SessionClosed)?;
        Ok(())
    }

    /// Subscribes to lifecycle notifications.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the connection URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Returns the default request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }
}

// ============================================================================
// Client - Events
// ============================================================================

impl Client {
    /// Sends a fire-and-forget event.
    ///
    /// While the channel is down the event is queued and sent after the next
    /// open, unless the client was disconnected manually, in which case it
    /// is dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if `data` cannot be serialized
    /// - [`Error::SessionClosed`] if the session task has stopped
    pub fn emit(&self, event: impl Into<String>, data: impl Serialize) -> Result<()> {
        let data = serde_json::to_value(data)?;
        self.post(SessionCommand::Emit {
            event: event.into(),
            data,
        })
    }

    /// Registers the handler for an inbound event, replacing any previous one.
    ///
    /// Handlers run on the session task and must not block.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(event, Arc::new(handler));
    }

    /// Removes the handler for an inbound event.
    pub fn off(&self, event: &str) -> bool {
        self.inner.dispatcher.off(event)
    }
}

// ============================================================================
// Client - Requests
// ============================================================================

impl Client {
    /// Sends a request and waits for its response with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ManualDisconnect`] after a manual disconnect
    /// - [`Error::ConnectionClosed`] if not open, or closed while waiting
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::Remote`] if the peer answered with an error
    pub async fn request(&self, endpoint: impl Into<String>, data: impl Serialize) -> Result<Value> {
        self.request_with_timeout(endpoint, data, self.inner.request_timeout)
            .await
    }

    /// Sends a request with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Same as [`Client::request`], plus [`Error::Json`] if `data` cannot be
    /// serialized.
    pub async fn request_with_timeout(
        &self,
        endpoint: impl Into<String>,
        data: impl Serialize,
        timeout: Duration,
    ) -> Result<Value> {
        let data = serde_json::to_value(data)?;
        let (reply, response) = oneshot::channel();

        self.post(SessionCommand::Request {
            endpoint: endpoint.into(),
            data,
            timeout,
            reply,
        })?;

        response.await?
    }

    /// Sends a request and deserializes the response payload.
    ///
    /// # Errors
    ///
    /// Same as [`Client::request`], plus [`Error::Json`] if the payload does
    /// not match `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        endpoint: impl Into<String>,
        data: impl Serialize,
    ) -> Result<T> {
        let value = self.request(endpoint, data).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the number of requests awaiting a response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session task has stopped.
    pub async fn pending_count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.post(SessionCommand::PendingCount(tx))?;
        Ok(rx.await?)
    }
}

// ============================================================================
// Client - Server Requests
// ============================================================================

impl Client {
    /// Registers the handler for a server-initiated request.
    ///
    /// The handler answers through the [`Responder`], now or later. Returning
    /// `Err` or panicking before answering sends an error with code 500.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRegistration`] if the endpoint already has a
    /// handler. The existing handler is kept.
    pub fn on_request<F>(&self, endpoint: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(Value, Responder) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.gateway.register(endpoint, Arc::new(handler))
    }

    /// Removes the handler for a server-initiated request.
    pub fn off_request(&self, endpoint: &str) -> bool {
        self.inner.gateway.unregister(endpoint)
    }

    /// Enables or disables handling of server-initiated requests.
    ///
    /// Enabling is refused with a warning unless the address is secure
    /// (`wss`/`https`) or loopback. Returns whether handling is now enabled.
    pub fn set_server_requests(&self, enabled: bool) -> bool {
        if enabled && !self.inner.trusted {
            warn!(
                url = %self.inner.url,
                "Server requests need a secure or loopback address, refusing to enable"
            );
            return self.inner.gateway.is_authorized();
        }

        self.inner.gateway.set_authorized(enabled);
        debug!(enabled, "Server requests toggled");
        enabled
    }

    /// Returns `true` if server-initiated requests are handled.
    #[inline]
    #[must_use]
    pub fn server_requests_enabled(&self) -> bool {
        self.inner.gateway.is_authorized()
    }
}

// ============================================================================
// Client - Internal
// ============================================================================

impl Client {
    fn post(&self, command: SessionCommand) -> Result<()> {
        self.inner
            .mailbox
            .send(command)
            .map_err(|_| Error::SessionClosed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde::Deserialize;
    use serde_json::json;

    use crate::client::ReconnectPolicy;
    use crate::transport::{MemoryLink, MemoryTransportFactory};

    fn client(base: &str) -> (Client, MemoryTransportFactory) {
        let factory = MemoryTransportFactory::new();
        let client = Client::builder(base)
            .reconnect(ReconnectPolicy::disabled())
            .transport(factory.clone())
            .build()
            .expect("client");
        (client, factory)
    }

    async fn open(client: &Client, factory: &MemoryTransportFactory) -> MemoryLink {
        client.wait_for_state(ConnectionState::Connecting).await.expect("connecting");
        let link = factory.last().expect("link");
        link.open();
        client.wait_for_state(ConnectionState::Open).await.expect("open");
        link
    }

    #[tokio::test]
    async fn test_auto_connect_opens_transport() {
        let (client, factory) = client("ws://127.0.0.1:9000");
        open(&client, &factory).await;
        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(factory.opened(), 1);
    }

    #[tokio::test]
    async fn test_request_as_deserializes() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Room {
            name: String,
            members: u32,
        }

        let (client, factory) = client("ws://127.0.0.1:9000");
        let link = open(&client, &factory).await;

        let caller = client.clone();
        let call = tokio::spawn(async move { caller.request_as::<Room>("room.get", json!({"id": 1})).await });

        while link.sent().is_empty() {
            tokio::task::yield_now().await;
        }
        let id = link.sent_json()[0]["request"]["id"].clone();
        link.push(json!({"response": {"id": id, "data": {"name": "lobby", "members": 3}}}).to_string());

        let room = call.await.expect("join").expect("room");
        assert_eq!(
            room,
            Room {
                name: "lobby".into(),
                members: 3
            }
        );
    }

    #[tokio::test]
    async fn test_remote_error_surfaces_code() {
        let (client, factory) = client("ws://127.0.0.1:9000");
        let link = open(&client, &factory).await;

        let caller = client.clone();
        let call = tokio::spawn(async move { caller.request("missing", Value::Null).await });

        while link.sent().is_empty() {
            tokio::task::yield_now().await;
        }
        let id = link.sent_json()[0]["request"]["id"].clone();
        link.push(json!({"response": {"id": id, "error": {"code": 404, "message": "no such endpoint"}}}).to_string());

        let err = call.await.expect("join").unwrap_err();
        assert_eq!(err.code(), Some(404));
        assert!(matches!(err, Error::Remote { .. }));
    }

    #[tokio::test]
    async fn test_set_server_requests_checks_address() {
        let (remote, _) = client("ws://example.com");
        assert!(!remote.set_server_requests(true));
        assert!(!remote.server_requests_enabled());

        let (secure, _) = client("wss://example.com");
        assert!(secure.set_server_requests(true));
        assert!(!secure.set_server_requests(false));

        let (local, _) = client("ws://localhost:9000");
        assert!(local.set_server_requests(true));
        assert!(local.server_requests_enabled());
    }

    #[tokio::test]
    async fn test_flags_are_per_client() {
        let (first, _) = client("ws://localhost:9000");
        let (second, _) = client("ws://localhost:9001");

        first.set_server_requests(true);
        assert!(first.server_requests_enabled());
        assert!(!second.server_requests_enabled());
    }

    #[tokio::test]
    async fn test_dropping_last_handle_stops_session() {
        let (client, factory) = client("ws://127.0.0.1:9000");
        let link = open(&client, &factory).await;
        let mut state = client.state_receiver();

        let clone = client.clone();
        drop(client);
        assert!(!link.close_requested());

        drop(clone);
        state
            .wait_for(|s| *s == ConnectionState::Closed)
            .await
            .expect("closed before sender dropped");
        assert!(link.close_requested());
    }

    #[tokio::test]
    async fn test_emit_rejects_unserializable_payload() {
        use std::collections::HashMap;

        let (client, _) = client("ws://127.0.0.1:9000");
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON object keys");

        let err = client.emit("bad", bad).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
