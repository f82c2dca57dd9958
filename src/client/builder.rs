//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use socket_session::{Client, ReconnectPolicy};
//!
//! # async fn example() -> socket_session::Result<()> {
//! let client = Client::builder("https://chat.example.com")
//!     .path("socket")
//!     .query("token", "abc123")
//!     .reconnect(ReconnectPolicy::new().with_max_attempts(10))
//!     .request_timeout(Duration::from_secs(30))
//!     .build()?;
//!
//! assert_eq!(client.url().as_str(), "wss://chat.example.com/socket?token=abc123");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::session::actor::{Session, SessionChannels};
use crate::session::dispatcher::Dispatcher;
use crate::session::gateway::Gateway;
use crate::session::{ConnectionState, SessionCommand};
use crate::transport::{TransportFactory, WebSocketTransportFactory};

use super::address::{connection_url, is_trusted_endpoint};
use super::core::{Client, ClientInner};
use super::options::ReconnectPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Default time a request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Lifecycle notifications buffered per subscriber.
const EVENT_CAPACITY: usize = 64;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`].
///
/// Use [`Client::builder()`] to create one.
#[derive(Clone)]
pub struct ClientBuilder {
    /// Base address, `ws`, `wss`, `http` or `https`.
    base: String,
    /// Sub-path appended to the base path.
    path: Option<String>,
    /// Query pairs appended to the URL.
    query: Vec<(String, String)>,
    /// Reconnection policy.
    reconnect: ReconnectPolicy,
    /// Default request timeout.
    request_timeout: Duration,
    /// Enable server-initiated requests at start.
    server_requests: bool,
    /// Start connecting as soon as the client is built.
    auto_connect: bool,
    /// Transport factory; WebSocket when unset.
    transport: Option<Arc<dyn TransportFactory>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base", &self.base)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("reconnect", &self.reconnect)
            .field("request_timeout", &self.request_timeout)
            .field("server_requests", &self.server_requests)
            .field("auto_connect", &self.auto_connect)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder for the given base address.
    #[inline]
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            path: None,
            query: Vec::new(),
            reconnect: ReconnectPolicy::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            server_requests: false,
            auto_connect: true,
            transport: None,
        }
    }

    /// Sets the sub-path appended to the base address.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Adds a query pair.
    #[inline]
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds several query pairs.
    #[inline]
    #[must_use]
    pub fn queries<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables server-initiated requests at start.
    ///
    /// Only honored for secure or loopback addresses.
    #[inline]
    #[must_use]
    pub fn server_requests(mut self, enabled: bool) -> Self {
        self.server_requests = enabled;
        self
    }

    /// Connects on build (default) or waits for [`Client::connect`].
    #[inline]
    #[must_use]
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    /// Uses a custom transport factory.
    #[inline]
    #[must_use]
    pub fn transport<F: TransportFactory>(mut self, factory: F) -> Self {
        self.transport = Some(Arc::new(factory));
        self
    }

    /// Builds the client and spawns its session task.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if called outside a tokio runtime, the timeout is
    ///   zero, the policy is inconsistent or the address is unusable
    /// - [`Error::Url`] if the base address does not parse
    pub fn build(self) -> Result<Client> {
        let runtime = Handle::try_current().map_err(|_| {
            Error::config("Client::build() must be called from within a tokio runtime")
        })?;
        self.validate()?;

        let url = connection_url(&self.base, self.path.as_deref(), &self.query)?;
        let trusted = is_trusted_endpoint(&url);

        let (mailbox, mailbox_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let dispatcher = Arc::new(Dispatcher::new());
        let gateway = Arc::new(Gateway::new());

        if self.server_requests {
            if trusted {
                gateway.set_authorized(true);
            } else {
                warn!(%url, "Server requests need a secure or loopback address, leaving them disabled");
            }
        }

        let factory: Arc<dyn TransportFactory> = match self.transport {
            Some(factory) => factory,
            None => Arc::new(WebSocketTransportFactory),
        };

        let session = Session::new(
            url.clone(),
            factory,
            self.reconnect,
            Arc::clone(&dispatcher),
            Arc::clone(&gateway),
            SessionChannels {
                mailbox: mailbox.clone(),
                state: state_tx,
                events: events_tx.clone(),
            },
        );
        runtime.spawn(session.run(mailbox_rx));

        debug!(%url, trusted, auto_connect = self.auto_connect, "Client built");

        if self.auto_connect {
            // Receiver was just created and cannot be gone.
            let _ = mailbox.send(SessionCommand::Connect);
        }

        Ok(Client::from_inner(ClientInner {
            url,
            trusted,
            request_timeout: self.request_timeout,
            mailbox,
            dispatcher,
            gateway,
            state: state_rx,
            events: events_tx,
        }))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be greater than zero"));
        }
        self.reconnect.validate().map_err(Error::config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::MemoryTransportFactory;

    #[test]
    fn test_defaults() {
        let builder = ClientBuilder::new("ws://localhost:9000");
        assert_eq!(builder.request_timeout, Duration::from_secs(300));
        assert!(builder.auto_connect);
        assert!(!builder.server_requests);
        assert!(builder.transport.is_none());
        assert_eq!(builder.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn test_query_methods_accumulate() {
        let builder = ClientBuilder::new("ws://localhost")
            .query("a", "1")
            .queries([("b", "2"), ("c", "3")]);
        assert_eq!(builder.query.len(), 3);
        assert_eq!(builder.query[2], ("c".to_string(), "3".to_string()));
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let err = ClientBuilder::new("ws://localhost:9000").build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let err = ClientBuilder::new("ws://localhost:9000")
            .request_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn test_build_assembles_url() {
        let client = ClientBuilder::new("http://localhost:9000/app")
            .path("socket")
            .query("room", "lobby")
            .transport(MemoryTransportFactory::new())
            .auto_connect(false)
            .build()
            .expect("client");

        assert_eq!(client.url().as_str(), "ws://localhost:9000/app/socket?room=lobby");
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_server_requests_refused_for_remote_plaintext() {
        let client = ClientBuilder::new("ws://example.com")
            .server_requests(true)
            .transport(MemoryTransportFactory::new())
            .auto_connect(false)
            .build()
            .expect("client");
        assert!(!client.server_requests_enabled());

        let client = ClientBuilder::new("ws://127.0.0.1:9000")
            .server_requests(true)
            .transport(MemoryTransportFactory::new())
            .auto_connect(false)
            .build()
            .expect("client");
        assert!(client.server_requests_enabled());
    }
}
