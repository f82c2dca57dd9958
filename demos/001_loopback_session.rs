//! Loopback session against an in-process peer.
//!
//! Demonstrates:
//! - Handshake acknowledgment and the `Connect` notification
//! - A correlated request and its response
//! - Answering a server-initiated request over loopback
//! - Queued events flushed after the peer drops the connection
//!
//! Usage:
//!   cargo run --example 001_loopback_session
//!   cargo run --example 001_loopback_session -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::Result;
use common::Args;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use socket_session::{Client, ReconnectPolicy, SessionEvent};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    println!("=== 001: Loopback Session ===\n");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(peer(listener));

    let client = Client::builder(format!("ws://{addr}"))
        .path("socket")
        .server_requests(true)
        .reconnect(
            ReconnectPolicy::new().with_delays(Duration::from_millis(250), Duration::from_secs(2)),
        )
        .build()?;
    let mut events = client.subscribe();

    client.on("notice", |data| println!("[Event] notice: {data}"));
    client.on_request("client.info", |_, responder| {
        responder.ok(json!({"name": "loopback-demo", "version": env!("CARGO_PKG_VERSION")}));
        Ok(())
    })?;

    // Step 1: Handshake
    wait_for(&mut events, SessionEvent::Connect).await?;
    println!("[1] Session acknowledged by peer");

    // Step 2: Request
    let sum = client.request("math.add", json!([20, 22])).await?;
    println!("[2] math.add -> {sum}");

    // Step 3: Peer drops us, events queue until the retry succeeds
    client.emit("drop.me", Value::Null)?;
    wait_for(&mut events, SessionEvent::Disconnect).await?;
    client.emit("queued", json!({"n": 1}))?;
    client.emit("queued", json!({"n": 2}))?;
    wait_for(&mut events, SessionEvent::Reconnect { attempts: 1 }).await?;
    println!("[3] Reconnected, queued events flushed");

    tokio::time::sleep(Duration::from_millis(100)).await;
    client.disconnect()?;
    println!("\n=== Done ===");
    Ok(())
}

async fn wait_for(
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
    wanted: SessionEvent,
) -> Result<()> {
    loop {
        if events.recv().await? == wanted {
            return Ok(());
        }
    }
}

// ============================================================================
// Peer
// ============================================================================

/// Minimal peer: acknowledges, answers `math.add`, asks for `client.info`,
/// and drops the connection when it sees `drop.me`.
async fn peer(listener: TcpListener) {
    while let Ok((stream, _)) = listener.accept().await {
        let Ok(mut ws) = accept_async(stream).await else {
            continue;
        };

        let hello = json!({"event": "__handshake__", "data": {"sid": "demo"}});
        let ask = json!({"request": {"id": "srv-1", "endpoint": "client.info", "data": null}});
        if ws.send(Message::Text(hello.to_string().into())).await.is_err()
            || ws.send(Message::Text(ask.to_string().into())).await.is_err()
        {
            continue;
        }

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                continue;
            };
            println!("    [Peer] received {frame}");

            if frame["event"] == "drop.me" {
                let _ = ws.close(None).await;
                break;
            }
            if frame["request"]["endpoint"] == "math.add" {
                let total: i64 = frame["request"]["data"]
                    .as_array()
                    .map(|items| items.iter().filter_map(Value::as_i64).sum())
                    .unwrap_or_default();
                let reply = json!({"response": {"id": frame["request"]["id"], "data": total}});
                let _ = ws.send(Message::Text(reply.to_string().into())).await;
            }
        }
    }
}
