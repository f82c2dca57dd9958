//! Shared utilities for integration tests.
//!
//! Provides a loopback WebSocket server that plays the peer, plus logging
//! setup and small waiting helpers.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use socket_session::{Client, SessionEvent};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Functions
// ============================================================================

/// Installs a log subscriber once, honoring `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("socket_session=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Waits for a specific lifecycle notification, skipping others.
pub async fn expect_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    wanted: SessionEvent,
) -> Result<()> {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await?;
            if event == wanted {
                return Ok::<_, anyhow::Error>(());
            }
        }
    })
    .await
    .with_context(|| format!("timed out waiting for {wanted:?}"))?
}

/// Waits until every command posted to the client so far has been handled.
pub async fn settle(client: &Client) {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    let _ = client.pending_count().await;
}

// ============================================================================
// TestServer
// ============================================================================

/// Loopback WebSocket server handing out accepted connections.
pub struct TestServer {
    addr: SocketAddr,
    accepted: mpsc::UnboundedReceiver<Peer>,
}

impl TestServer {
    /// Binds to an ephemeral loopback port and starts accepting.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, accepted) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        if tx.send(Peer { ws }).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Handshake failed"),
                }
            }
        });

        Ok(Self { addr, accepted })
    }

    /// Base address for [`Client::builder`].
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> Result<Peer> {
        timeout(WAIT, self.accepted.recv())
            .await
            .context("timed out waiting for a connection")?
            .context("server stopped")
    }
}

// ============================================================================
// Peer
// ============================================================================

/// Server side of one accepted connection.
pub struct Peer {
    ws: WebSocketStream<TcpStream>,
}

impl Peer {
    /// Sends a JSON text frame.
    pub async fn send_json(&mut self, value: Value) -> Result<()> {
        self.ws.send(Message::Text(value.to_string().into())).await?;
        Ok(())
    }

    /// Receives the next text frame as JSON, skipping control frames.
    pub async fn recv_json(&mut self) -> Result<Value> {
        timeout(WAIT, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(text.as_str())?),
                    Some(Ok(Message::Close(_))) | None => bail!("connection closed"),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }
        })
        .await
        .context("timed out waiting for a frame")?
    }

    /// Waits for the client to close the connection.
    pub async fn expect_close(&mut self) -> Result<()> {
        timeout(WAIT, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await
        .context("client did not close")
    }

    /// Closes the connection from the server side.
    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
