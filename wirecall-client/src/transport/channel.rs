//! Message-channel transport
//!
//! Talks to a JSON-RPC endpoint living in another execution context (a
//! task, a thread, an embedded engine) through a pair of in-process queues.
//! [`message_channel`] creates both ends: the [`MessagePort`] goes into the
//! transport, the [`MessagePeer`] to whoever serves the requests.
//!
//! Every payload travels inside a [`ChannelRequest`] tagged with a
//! transport-local `internal_id`, unrelated to the JSON-RPC id. The peer
//! answers each one with exactly one [`ChannelReply`] carrying the same
//! `internal_id`.

use super::{DataCallback, ErrorCallback, Subscribers, Transport};
use crate::connection_state::{ConnectionState, StateCell};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use wirecall_core::{Error, JsonRpcResponse, Result};

/// Reply timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Envelope sent to the peer
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRequest {
    pub internal_id: u64,
    pub target_origin: String,
    pub payload: String,
}

/// Envelope sent back by the peer
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelReply {
    /// The peer produced a reply payload
    Data { internal_id: u64, payload: String },
    /// The peer failed to handle the request
    Crash {
        internal_id: u64,
        description: String,
    },
}

impl ChannelReply {
    pub fn internal_id(&self) -> u64 {
        match self {
            ChannelReply::Data { internal_id, .. } | ChannelReply::Crash { internal_id, .. } => {
                *internal_id
            }
        }
    }
}

/// Transport side of a message channel
#[derive(Debug)]
pub struct MessagePort {
    requests: mpsc::UnboundedSender<ChannelRequest>,
    replies: mpsc::UnboundedReceiver<ChannelReply>,
}

/// Serving side of a message channel
#[derive(Debug)]
pub struct MessagePeer {
    requests: mpsc::UnboundedReceiver<ChannelRequest>,
    replies: mpsc::UnboundedSender<ChannelReply>,
}

/// Create a connected port/peer pair
pub fn message_channel() -> (MessagePort, MessagePeer) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    (
        MessagePort {
            requests: request_tx,
            replies: reply_rx,
        },
        MessagePeer {
            requests: request_rx,
            replies: reply_tx,
        },
    )
}

impl MessagePeer {
    /// Next request, or `None` once the transport is gone
    pub async fn recv(&mut self) -> Option<ChannelRequest> {
        self.requests.recv().await
    }

    pub fn respond(&self, reply: ChannelReply) -> Result<()> {
        self.replies
            .send(reply)
            .map_err(|_| Error::Channel("message channel closed".to_string()))
    }

    pub fn reply(&self, internal_id: u64, payload: impl Into<String>) -> Result<()> {
        self.respond(ChannelReply::Data {
            internal_id,
            payload: payload.into(),
        })
    }

    pub fn crash(&self, internal_id: u64, description: impl Into<String>) -> Result<()> {
        self.respond(ChannelReply::Crash {
            internal_id,
            description: description.into(),
        })
    }
}

type Waiters = Mutex<HashMap<u64, oneshot::Sender<Result<String>>>>;

struct Inner {
    target: String,
    target_origin: String,
    timeout: Duration,
    next_internal_id: AtomicU64,
    requests: mpsc::UnboundedSender<ChannelRequest>,
    replies: Mutex<Option<mpsc::UnboundedReceiver<ChannelReply>>>,
    waiters: Waiters,
    state: StateCell,
    data_subscribers: Subscribers<str>,
    error_subscribers: Subscribers<Error>,
    router: Mutex<Option<JoinHandle<()>>>,
}

/// JSON-RPC over a [`message_channel`]
///
/// ```rust
/// use wirecall_client::{message_channel, MessageChannelTransport, Transport};
///
/// # async fn run() -> wirecall_core::Result<()> {
/// let (port, mut peer) = message_channel();
/// tokio::spawn(async move {
///     while let Some(request) = peer.recv().await {
///         let _ = peer.reply(request.internal_id, r#"{"jsonrpc":"2.0","id":"0","result":"0x1"}"#);
///     }
/// });
///
/// let transport = MessageChannelTransport::new(port, "https://wallet.example");
/// transport.connect().await?;
/// let reply = transport.send_and_wait("{}".to_string(), None).await?;
/// assert!(reply.contains("0x1"));
/// # Ok(())
/// # }
/// ```
pub struct MessageChannelTransport {
    inner: Arc<Inner>,
}

impl MessageChannelTransport {
    /// `target` is the descriptor of the serving context; only `http` and
    /// `https` targets connect.
    pub fn new(port: MessagePort, target: impl Into<String>) -> Self {
        let target = target.into();
        let target_origin = origin_of(&target).unwrap_or_else(|| target.clone());
        Self {
            inner: Arc::new(Inner {
                target,
                target_origin,
                timeout: DEFAULT_TIMEOUT,
                next_internal_id: AtomicU64::new(0),
                requests: port.requests,
                replies: Mutex::new(Some(port.replies)),
                waiters: Mutex::new(HashMap::new()),
                state: StateCell::new(),
                data_subscribers: Subscribers::new(),
                error_subscribers: Subscribers::new(),
                router: Mutex::new(None),
            }),
        }
    }

    /// Override the reply timeout; only valid before the transport is shared
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.timeout = timeout;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Send a payload and wait for the peer's reply
    ///
    /// Waits at most `timeout`, or the transport's configured timeout when
    /// `None`. A reply that is a JSON-RPC error response fails with
    /// `Error::JsonRpc` carrying the error object as received.
    pub async fn send_and_wait(&self, payload: String, timeout: Option<Duration>) -> Result<String> {
        let reply = self.inner.round_trip(payload, timeout).await?;
        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&reply) {
            if let Some(error) = response.error {
                return Err(Error::JsonRpc(error));
            }
        }
        Ok(reply)
    }
}

impl Inner {
    fn dispatch(&self, payload: String) -> Result<(u64, oneshot::Receiver<Result<String>>)> {
        if self.state.get().is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let internal_id = self.next_internal_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(internal_id, tx);

        let request = ChannelRequest {
            internal_id,
            target_origin: self.target_origin.clone(),
            payload,
        };
        if self.requests.send(request).is_err() {
            self.forget(internal_id);
            return Err(Error::Channel("message channel closed".to_string()));
        }
        tracing::trace!(internal_id, "message posted");
        Ok((internal_id, rx))
    }

    async fn round_trip(&self, payload: String, timeout: Option<Duration>) -> Result<String> {
        let (internal_id, rx) = self.dispatch(payload)?;
        let timeout = timeout.unwrap_or(self.timeout);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.forget(internal_id);
                tracing::debug!(internal_id, ?timeout, "message reply timed out");
                Err(Error::Timeout)
            }
        }
    }

    fn forget(&self, internal_id: u64) {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&internal_id);
    }

    fn route(&self, reply: ChannelReply) {
        let internal_id = reply.internal_id();
        let waiter = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&internal_id);
        let Some(waiter) = waiter else {
            tracing::warn!(internal_id, "dropping reply for unknown message");
            return;
        };
        let outcome = match reply {
            ChannelReply::Data { payload, .. } => Ok(payload),
            ChannelReply::Crash { description, .. } => Err(Error::Channel(description)),
        };
        let _ = waiter.send(outcome);
    }

    fn fail_waiters(&self, error: Error) {
        let waiters: Vec<_> = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, tx)| tx)
            .collect();
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }
}

#[async_trait]
impl Transport for MessageChannelTransport {
    #[tracing::instrument(skip(self), fields(endpoint = %self.inner.target))]
    async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        match inner.state.get() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Closed => return Err(Error::ConnectionClosed),
            _ => {}
        }
        if origin_of(&inner.target).is_none() {
            tracing::error!("rejecting message channel target");
            return Err(Error::Connection("Bad URI".to_string()));
        }

        let replies = inner
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut replies) = replies else {
            // the router already ran; a disconnected channel cannot come back
            return match inner.state.get() {
                ConnectionState::Disconnected => {
                    Err(Error::Channel("message channel closed".to_string()))
                }
                _ => Ok(()),
            };
        };

        let shared = Arc::downgrade(inner);
        let router = tokio::spawn(async move {
            while let Some(reply) = replies.recv().await {
                let Some(inner) = shared.upgrade() else { return };
                inner.route(reply);
            }
            if let Some(inner) = shared.upgrade() {
                if inner.state.set(ConnectionState::Disconnected) {
                    let error = Error::Channel("message channel closed".to_string());
                    tracing::warn!("message channel peer went away");
                    inner.fail_waiters(error.clone());
                    inner.error_subscribers.emit(&error);
                }
            }
        });
        *inner.router.lock().unwrap_or_else(PoisonError::into_inner) = Some(router);

        if !inner.state.set(ConnectionState::Connected) {
            return Err(Error::ConnectionClosed);
        }
        tracing::info!(origin = %inner.target_origin, "message channel connected");
        Ok(())
    }

    fn send_data(&self, payload: String) {
        let inner = self.inner.clone();
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                inner
                    .error_subscribers
                    .emit(&Error::Internal(format!("no async runtime: {}", e)));
                return;
            }
        };
        handle.spawn(async move {
            match inner.round_trip(payload, None).await {
                Ok(reply) => inner.data_subscribers.emit(&reply),
                Err(e) => {
                    tracing::warn!(error = %e, "message delivery failed");
                    inner.error_subscribers.emit(&e);
                }
            }
        });
    }

    fn on_data(&self, callback: DataCallback) {
        self.inner.data_subscribers.subscribe(callback);
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.inner.error_subscribers.subscribe(callback);
    }

    fn close(&self) {
        if !self.inner.state.close() {
            return;
        }
        tracing::info!(endpoint = %self.inner.target, "closing message channel");
        if let Some(router) = self
            .inner
            .router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            router.abort();
        }
        self.inner.fail_waiters(Error::ConnectionClosed);
    }

    fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }
}

impl Drop for MessageChannelTransport {
    fn drop(&mut self) {
        if let Some(router) = self
            .inner
            .router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            router.abort();
        }
    }
}

/// `scheme://host[:port]` for http(s) targets, `None` for anything else
///
/// Only the scheme is normalized. Userinfo and IPv6 brackets in the
/// authority are passed through unchanged.
fn origin_of(target: &str) -> Option<String> {
    let (scheme, rest) = target.split_once("://")?;
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return None;
    }
    Some(format!("{}://{}", scheme, authority))
}
