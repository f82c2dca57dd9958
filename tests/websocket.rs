//! End-to-end tests over a real loopback WebSocket.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use socket_session::{Client, ConnectionState, Error, ReconnectPolicy, SessionEvent};
use tokio::sync::Notify;
use tokio::time::timeout;

use common::{TestServer, WAIT, expect_event, init_logging};

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::new()
        .with_max_attempts(5)
        .with_delays(Duration::from_millis(200), Duration::from_secs(1))
}

#[tokio::test]
async fn request_round_trip() -> Result<()> {
    init_logging();
    let mut server = TestServer::start().await?;
    let client = Client::builder(server.url()).path("socket").build()?;
    let mut peer = server.accept().await?;
    client.wait_for_state(ConnectionState::Open).await?;

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.request("math.add", json!([2, 3])).await });

    let frame = peer.recv_json().await?;
    assert_eq!(frame["request"]["endpoint"], "math.add");
    assert_eq!(frame["request"]["data"], json!([2, 3]));
    let id = frame["request"]["id"].clone();

    peer.send_json(json!({"response": {"id": id, "data": 5}})).await?;

    let result = timeout(WAIT, call).await???;
    assert_eq!(result, json!(5));
    assert_eq!(client.pending_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn handshake_event_signals_connect() -> Result<()> {
    init_logging();
    let mut server = TestServer::start().await?;
    let client = Client::builder(server.url()).build()?;
    let mut events = client.subscribe();
    let mut peer = server.accept().await?;

    peer.send_json(json!({"event": "__handshake__", "data": {"sid": "s1"}}))
        .await?;
    expect_event(&mut events, SessionEvent::Connect).await?;
    Ok(())
}

#[tokio::test]
async fn server_request_answered_over_loopback() -> Result<()> {
    init_logging();
    let mut server = TestServer::start().await?;
    let client = Client::builder(server.url()).build()?;
    client.on_request("sum", |data, responder| {
        let total: i64 = data
            .as_array()
            .map(|items| items.iter().filter_map(|v| v.as_i64()).sum())
            .unwrap_or_default();
        responder.ok(json!(total));
        Ok(())
    })?;

    let marker = Arc::new(Notify::new());
    let signal = Arc::clone(&marker);
    client.on("marker", move |_| signal.notify_one());

    let mut peer = server.accept().await?;
    client.wait_for_state(ConnectionState::Open).await?;

    // Dropped: handling is off by default.
    peer.send_json(json!({"request": {"id": "u1", "endpoint": "sum", "data": [1]}}))
        .await?;
    peer.send_json(json!({"event": "marker"})).await?;
    timeout(WAIT, marker.notified()).await?;

    assert!(client.set_server_requests(true));
    peer.send_json(json!({"request": {"id": "a1", "endpoint": "sum", "data": [1, 2, 3]}}))
        .await?;
    peer.send_json(json!({"request": {"id": "a2", "endpoint": "missing", "data": null}}))
        .await?;

    let first = peer.recv_json().await?;
    assert_eq!(first, json!({"response": {"id": "a1", "data": 6}}));

    let second = peer.recv_json().await?;
    assert_eq!(second["response"]["id"], "a2");
    assert_eq!(second["response"]["error"]["code"], 404);
    Ok(())
}

#[tokio::test]
async fn reconnect_flushes_queued_events_in_order() -> Result<()> {
    init_logging();
    let mut server = TestServer::start().await?;
    let client = Client::builder(server.url()).reconnect(fast_policy()).build()?;
    let mut events = client.subscribe();

    let first = server.accept().await?;
    client.wait_for_state(ConnectionState::Open).await?;
    first.close().await?;
    expect_event(&mut events, SessionEvent::Disconnect).await?;

    client.emit("one", json!(1))?;
    client.emit("two", json!(2))?;
    client.emit("three", json!(3))?;

    let mut second = server.accept().await?;
    expect_event(&mut events, SessionEvent::Reconnect { attempts: 1 }).await?;

    for expected in ["one", "two", "three"] {
        let frame = second.recv_json().await?;
        assert_eq!(frame["event"], expected);
    }
    Ok(())
}

#[tokio::test]
async fn close_fails_pending_requests() -> Result<()> {
    init_logging();
    let mut server = TestServer::start().await?;
    let client = Client::builder(server.url())
        .reconnect(ReconnectPolicy::disabled())
        .build()?;
    let mut peer = server.accept().await?;
    client.wait_for_state(ConnectionState::Open).await?;

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.request("never", json!(null)).await });
    peer.recv_json().await?;
    peer.close().await?;

    let err = timeout(WAIT, call).await??.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    client.wait_for_state(ConnectionState::Closed).await?;
    Ok(())
}

#[tokio::test]
async fn manual_disconnect_closes_socket_and_resume_reconnects() -> Result<()> {
    init_logging();
    let mut server = TestServer::start().await?;
    let client = Client::builder(server.url()).reconnect(fast_policy()).build()?;
    let mut peer = server.accept().await?;
    client.wait_for_state(ConnectionState::Open).await?;

    client.disconnect()?;
    peer.expect_close().await?;
    client.wait_for_state(ConnectionState::Closed).await?;

    client.emit("dropped", json!(null))?;
    let err = client.request("blocked", json!(null)).await.unwrap_err();
    assert!(matches!(err, Error::ManualDisconnect));

    client.resume()?;
    let mut resumed = server.accept().await?;
    client.wait_for_state(ConnectionState::Open).await?;

    client.emit("fresh", json!(null))?;
    let frame = resumed.recv_json().await?;
    assert_eq!(frame["event"], "fresh");
    Ok(())
}

#[tokio::test]
async fn unreachable_server_gives_up_after_max_attempts() -> Result<()> {
    init_logging();
    // Bind then drop to get a port with nothing listening.
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };

    let client = Client::builder(format!("ws://127.0.0.1:{port}"))
        .reconnect(
            ReconnectPolicy::new()
                .with_max_attempts(2)
                .with_delays(Duration::from_millis(10), Duration::from_millis(20)),
        )
        .build()?;
    let mut events = client.subscribe();

    expect_event(&mut events, SessionEvent::ReconnectFailed).await?;
    assert_eq!(client.state(), ConnectionState::Closed);
    Ok(())
}
