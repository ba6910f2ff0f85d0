//! Message-channel transport

mod common;

use common::next;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wirecall_client::{
    message_channel, ConnectionState, ManagerBuilder, MessageChannelTransport, MessagePeer,
    Transport, DEFAULT_TIMEOUT,
};
use wirecall_core::Error;

/// Peer that answers every request with a response echoing its method
fn spawn_echo_peer(mut peer: MessagePeer) {
    tokio::spawn(async move {
        while let Some(request) = peer.recv().await {
            let value: Value = serde_json::from_str(&request.payload).unwrap_or(Value::Null);
            let reply = json!({"jsonrpc": "2.0", "id": value["id"], "result": value["method"]});
            let _ = peer.reply(request.internal_id, reply.to_string());
        }
    });
}

#[tokio::test]
async fn test_connect_rejects_non_http_targets() {
    for target in ["foo://host", "ws://localhost:8546", "file:///tmp/x", "localhost"] {
        let (port, _peer) = message_channel();
        let transport = MessageChannelTransport::new(port, target);
        match transport.connect().await {
            Err(Error::Connection(reason)) => assert_eq!(reason, "Bad URI"),
            other => panic!("{}: expected Bad URI, got {:?}", target, other),
        }
    }
}

#[tokio::test]
async fn test_send_and_wait_returns_reply() {
    let (port, peer) = message_channel();
    spawn_echo_peer(peer);
    let transport = MessageChannelTransport::new(port, "https://wallet.example");
    transport.connect().await.unwrap();
    assert_eq!(transport.state(), ConnectionState::Connected);

    let reply = transport
        .send_and_wait(
            r#"{"jsonrpc":"2.0","id":"0","method":"eth_chainId","params":[]}"#.to_string(),
            None,
        )
        .await
        .unwrap();
    let reply: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply["result"], json!("eth_chainId"));
}

#[tokio::test]
async fn test_error_reply_rejects_with_error_object() {
    let (port, mut peer) = message_channel();
    let transport = MessageChannelTransport::new(port, "https://wallet.example");
    transport.connect().await.unwrap();

    tokio::spawn(async move {
        let request = peer.recv().await.unwrap();
        let reply = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "error": {"code": 4001, "message": "User rejected the request.", "data": {"origin": "dapp"}}
        });
        peer.reply(request.internal_id, reply.to_string()).unwrap();
        // keep the peer alive until the test finishes
        let _ = peer.recv().await;
    });

    match transport.send_and_wait("{}".to_string(), None).await {
        Err(Error::JsonRpc(data)) => {
            assert_eq!(data.code, 4001);
            assert_eq!(data.message, "User rejected the request.");
            assert_eq!(data.data, Some(json!({"origin": "dapp"})));
        }
        other => panic!("expected JSON-RPC error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_crash_reply_is_a_channel_error() {
    let (port, mut peer) = message_channel();
    let transport = MessageChannelTransport::new(port, "https://wallet.example");
    transport.connect().await.unwrap();

    tokio::spawn(async move {
        let request = peer.recv().await.unwrap();
        peer.crash(request.internal_id, "handler panicked").unwrap();
        let _ = peer.recv().await;
    });

    match transport.send_and_wait("{}".to_string(), None).await {
        Err(Error::Channel(description)) => assert_eq!(description, "handler panicked"),
        other => panic!("expected channel error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_explicit_timeout() {
    let (port, _peer) = message_channel();
    let transport = MessageChannelTransport::new(port, "https://wallet.example");
    transport.connect().await.unwrap();

    let outcome = transport
        .send_and_wait("{}".to_string(), Some(Duration::from_millis(20)))
        .await;
    assert!(matches!(outcome, Err(Error::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout() {
    let (port, _peer) = message_channel();
    let transport = MessageChannelTransport::new(port, "https://wallet.example");
    transport.connect().await.unwrap();

    let started = tokio::time::Instant::now();
    let outcome = transport.send_and_wait("{}".to_string(), None).await;
    assert!(matches!(outcome, Err(Error::Timeout)));
    assert!(started.elapsed() >= DEFAULT_TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn test_configured_timeout() {
    let (port, _peer) = message_channel();
    let transport = MessageChannelTransport::new(port, "https://wallet.example")
        .with_timeout(Duration::from_secs(30));
    transport.connect().await.unwrap();

    let started = tokio::time::Instant::now();
    let outcome = transport.send_and_wait("{}".to_string(), None).await;
    assert!(matches!(outcome, Err(Error::Timeout)));
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test]
async fn test_send_data_reports_crash_to_error_subscribers() {
    let (port, mut peer) = message_channel();
    let transport = MessageChannelTransport::new(port, "https://wallet.example");
    let (tx, mut rx) = mpsc::unbounded_channel();
    transport.on_error(Arc::new(move |error: &Error| {
        let _ = tx.send(error.clone());
    }));
    transport.connect().await.unwrap();

    tokio::spawn(async move {
        let request = peer.recv().await.unwrap();
        peer.crash(request.internal_id, "out of memory").unwrap();
        let _ = peer.recv().await;
    });
    transport.send_data("{}".to_string());

    assert!(matches!(next(&mut rx).await, Error::Channel(d) if d == "out of memory"));
}

#[tokio::test]
async fn test_close_fails_outstanding_waits() {
    let (port, _peer) = message_channel();
    let transport = Arc::new(MessageChannelTransport::new(port, "https://wallet.example"));
    transport.connect().await.unwrap();

    let waiting = tokio::spawn({
        let transport = transport.clone();
        async move { transport.send_and_wait("{}".to_string(), None).await }
    });
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    transport.close();
    transport.close();
    assert!(matches!(waiting.await.unwrap(), Err(Error::ConnectionClosed)));
    assert_eq!(transport.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_manager_over_message_channel() {
    let (port, peer) = message_channel();
    spawn_echo_peer(peer);
    let manager = ManagerBuilder::new()
        .transport(MessageChannelTransport::new(port, "https://wallet.example"))
        .build()
        .unwrap();
    manager.connect().await.unwrap();

    let accounts = manager.request("eth_requestAccounts", json!([]));
    let chain = manager.request("eth_chainId", json!([]));
    assert_eq!(chain.await.unwrap(), json!("eth_chainId"));
    assert_eq!(accounts.await.unwrap(), json!("eth_requestAccounts"));
}

#[tokio::test]
async fn test_manager_batch_over_message_channel() {
    let (port, mut peer) = message_channel();
    let manager = ManagerBuilder::new()
        .transport(MessageChannelTransport::new(port, "https://wallet.example"))
        .build()
        .unwrap();
    manager.connect().await.unwrap();

    manager.start_batch();
    let a = manager.request("eth_blockNumber", json!([]));
    let b = manager.request("eth_gasPrice", json!([]));
    manager.stop_batch().unwrap();

    let request = peer.recv().await.unwrap();
    let batch: Value = serde_json::from_str(&request.payload).unwrap();
    assert_eq!(batch.as_array().unwrap().len(), 2);
    let reply = json!([
        {"jsonrpc": "2.0", "id": "1", "result": "0x3b9aca00"},
        {"jsonrpc": "2.0", "id": "0", "result": "0x10"}
    ]);
    peer.reply(request.internal_id, reply.to_string()).unwrap();

    assert_eq!(a.await.unwrap(), json!("0x10"));
    assert_eq!(b.await.unwrap(), json!("0x3b9aca00"));
}
