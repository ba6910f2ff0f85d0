//! Shared helpers for wirecall-client integration tests
//!
//! - [`MockWsServer`]: an in-process WebSocket server that records what it
//!   receives, can answer through a responder function, and can push frames
//!   or a close frame on demand
//! - [`RecordingTransport`]: a transport that records outbound payloads and
//!   lets the test inject inbound ones

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use wirecall_client::{
    ConnectionState, DataCallback, ErrorCallback, RequestManager, StateCell, Subscribers,
    Transport,
};
use wirecall_core::{Error, Result};

/// How long helpers wait for something to show up
pub const WAIT: Duration = Duration::from_secs(5);

type Responder = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

enum Command {
    Text(String),
    Close(u16, String),
}

/// WebSocket server serving one connection at a time
pub struct MockWsServer {
    addr: SocketAddr,
    received: mpsc::UnboundedReceiver<String>,
    commands: mpsc::UnboundedSender<Command>,
    task: tokio::task::JoinHandle<()>,
}

impl MockWsServer {
    /// A server that never answers on its own
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// A server that answers each text frame with whatever `responder`
    /// returns
    pub async fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::spawn(Some(Box::new(responder))).await
    }

    /// A server answering every request (or batch) with `result` set to the
    /// method name
    pub async fn echo_method() -> Self {
        Self::with_responder(|text| {
            let value: Value = serde_json::from_str(text).ok()?;
            let reply = match value {
                Value::Array(items) => Value::Array(items.iter().map(echo_one).collect()),
                single => echo_one(&single),
            };
            Some(reply.to_string())
        })
        .await
    }

    async fn spawn(responder: Option<Responder>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (commands, mut command_rx) = mpsc::unbounded_channel::<Command>();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let (mut write, mut read) = ws.split();
                loop {
                    tokio::select! {
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                let _ = received_tx.send(text.clone());
                                if let Some(reply) = responder.as_ref().and_then(|r| r(&text)) {
                                    let _ = write.send(Message::Text(reply)).await;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                            Some(Ok(_)) => {}
                        },
                        command = command_rx.recv() => match command {
                            Some(Command::Text(text)) => {
                                let _ = write.send(Message::Text(text)).await;
                            }
                            Some(Command::Close(code, reason)) => {
                                let frame = CloseFrame {
                                    code: CloseCode::from(code),
                                    reason: reason.into(),
                                };
                                let _ = write.send(Message::Close(Some(frame))).await;
                                break;
                            }
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            addr,
            received,
            commands,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Next text frame the server received
    pub async fn next_message(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Push a text frame to the connected client
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.commands.send(Command::Text(text.into()));
    }

    /// Close the connection with the given code and reason
    pub fn close_with(&self, code: u16, reason: &str) {
        let _ = self.commands.send(Command::Close(code, reason.to_string()));
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn echo_one(request: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": request["id"].clone(),
        "result": request["method"].clone(),
    })
}

/// Transport that records what is sent and lets tests inject replies
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    data: Subscribers<str>,
    errors: Subscribers<Error>,
    state: StateCell,
    connect_error: Option<Error>,
    connects: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// A transport whose `connect` always fails with `error`
    pub fn failing(error: Error) -> Arc<Self> {
        Arc::new(Self::build(Some(error)))
    }

    fn build(connect_error: Option<Error>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            data: Subscribers::new(),
            errors: Subscribers::new(),
            state: StateCell::new(),
            connect_error,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|payload| serde_json::from_str(payload).unwrap())
            .collect()
    }

    /// Hand an inbound payload to the data subscribers
    pub fn deliver(&self, payload: impl AsRef<str>) {
        self.data.emit(payload.as_ref());
    }

    /// Report a channel failure to the error subscribers
    pub fn fail(&self, error: Error) {
        self.errors.emit(&error);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.connect_error {
            return Err(error.clone());
        }
        self.state.set(ConnectionState::Connected);
        Ok(())
    }

    fn send_data(&self, payload: String) {
        self.sent.lock().unwrap().push(payload);
    }

    fn on_data(&self, callback: DataCallback) {
        self.data.subscribe(callback);
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.errors.subscribe(callback);
    }

    fn close(&self) {
        self.state.close();
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

/// Manager over the given recording transports, already connected
pub async fn connected_manager(transports: &[Arc<RecordingTransport>]) -> RequestManager {
    let boxed: Vec<Box<dyn Transport>> = transports
        .iter()
        .map(|t| Box::new(t.clone()) as Box<dyn Transport>)
        .collect();
    let manager = RequestManager::new(boxed).unwrap();
    manager.connect().await.unwrap();
    manager
}

/// Collect protocol diagnostics into a channel
pub fn diagnostics(manager: &RequestManager) -> mpsc::UnboundedReceiver<Error> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.on_protocol_error(Arc::new(move |error: &Error| {
        let _ = tx.send(error.clone());
    }));
    rx
}

/// Wait for the next item of a channel
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting")
        .expect("channel closed")
}

pub fn result(id: &str, value: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": value}).to_string()
}
