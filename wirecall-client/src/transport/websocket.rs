//! WebSocket transport
//!
//! One WebSocket connection, split into a writer task that drains an
//! outbound queue and a reader task that hands every text frame to the data
//! subscribers. The outbound queue exists from construction on, so payloads
//! sent before [`Transport::connect`] are delivered once the handshake is
//! done.

use super::{DataCallback, ErrorCallback, Subscribers, Transport};
use crate::connection_state::{ConnectionState, StateCell};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use wirecall_core::{Error, Result};

enum Outbound {
    Text(String),
    Close,
}

/// JSON-RPC over a single WebSocket connection
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use wirecall_client::{Transport, WebSocketTransport};
///
/// # async fn run() -> wirecall_core::Result<()> {
/// let transport = WebSocketTransport::new("ws://localhost:8546");
/// transport.on_data(Arc::new(|payload: &str| println!("<- {}", payload)));
/// transport.connect().await?;
/// transport.send_data(r#"{"jsonrpc":"2.0","id":"0","method":"eth_blockNumber","params":[]}"#.into());
/// # Ok(())
/// # }
/// ```
pub struct WebSocketTransport {
    uri: String,
    state: Arc<StateCell>,
    data_subscribers: Arc<Subscribers<str>>,
    error_subscribers: Arc<Subscribers<Error>>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl WebSocketTransport {
    pub fn new(uri: impl Into<String>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            uri: uri.into(),
            state: Arc::new(StateCell::new()),
            data_subscribers: Arc::new(Subscribers::new()),
            error_subscribers: Arc::new(Subscribers::new()),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            tasks: Mutex::new(Vec::new()),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    #[tracing::instrument(skip(self), fields(uri = %self.uri))]
    async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        match self.state.get() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Closed => return Err(Error::ConnectionClosed),
            _ => {}
        }
        // a previous connection's writer owns the queue
        let mut outbound_rx = self
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                Error::Connection("websocket transport cannot reconnect after a dropped connection".to_string())
            })?;
        self.state.set(ConnectionState::Connecting);

        let (stream, _) = match connect_async(self.uri.as_str()).await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::error!(error = %e, "websocket handshake failed");
                *self.outbound_rx.lock().unwrap_or_else(PoisonError::into_inner) = Some(outbound_rx);
                self.state.set(ConnectionState::Disconnected);
                return Err(Error::Connection(e.to_string()));
            }
        };

        let (mut sink, mut source) = stream.split();

        let errors = self.error_subscribers.clone();
        let state = self.state.clone();
        let writer = tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Text(payload) => {
                        if let Err(e) = sink.send(Message::Text(payload)).await {
                            if !state.get().is_closed() {
                                tracing::warn!(error = %e, "websocket send failed");
                                errors.emit(&Error::Channel(e.to_string()));
                            }
                            break;
                        }
                    }
                    Outbound::Close => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                            tracing::debug!(error = %e, "close frame not delivered");
                        }
                        break;
                    }
                }
            }
        });

        let data = self.data_subscribers.clone();
        let errors = self.error_subscribers.clone();
        let state = self.state.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(payload)) => data.emit(&payload),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(payload) => data.emit(&payload),
                        Err(_) => tracing::warn!("dropping non UTF-8 binary frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        if let Some(frame) = frame {
                            if frame.code != CloseCode::Normal {
                                let error = Error::Channel(format!(
                                    "Websocket Close Error: CODE: {} REASON: {}",
                                    u16::from(frame.code),
                                    frame.reason
                                ));
                                tracing::warn!(error = %error, "websocket closed abnormally");
                                errors.emit(&error);
                            }
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if !state.get().is_closed() {
                            tracing::warn!(error = %e, "websocket stream error");
                            errors.emit(&Error::Channel(e.to_string()));
                        }
                        break;
                    }
                }
            }
            if state.set(ConnectionState::Disconnected) {
                tracing::info!("websocket disconnected");
            }
        });

        {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.push(writer);
            tasks.push(reader);
        }

        if !self.state.set(ConnectionState::Connected) {
            // closed while the handshake was in flight
            let _ = self.outbound_tx.send(Outbound::Close);
            return Err(Error::ConnectionClosed);
        }
        tracing::info!("websocket connected");
        Ok(())
    }

    fn send_data(&self, payload: String) {
        if self.state.get().is_closed() {
            tracing::warn!("send on closed websocket transport");
            self.error_subscribers.emit(&Error::ConnectionClosed);
            return;
        }
        tracing::trace!(bytes = payload.len(), "queueing websocket payload");
        if self.outbound_tx.send(Outbound::Text(payload)).is_err() {
            self.error_subscribers
                .emit(&Error::Channel("websocket writer stopped".to_string()));
        }
    }

    fn on_data(&self, callback: DataCallback) {
        self.data_subscribers.subscribe(callback);
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.error_subscribers.subscribe(callback);
    }

    fn close(&self) {
        let was = self.state.get();
        if !self.state.close() {
            return;
        }
        tracing::info!(uri = %self.uri, "closing websocket");
        if was == ConnectionState::Connected {
            // The writer sends the close frame; the reader ends on the echo.
            let _ = self.outbound_tx.send(Outbound::Close);
        } else {
            self.abort_tasks();
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

impl WebSocketTransport {
    fn abort_tasks(&self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
