//! Request manager
//!
//! [`RequestManager`] turns method calls into JSON-RPC requests, sends them
//! through the first of its transports, and settles the caller's
//! [`ResponseFuture`] when the matching response comes back.
//!
//! # Correlation
//!
//! Every request gets the next value of a per-manager counter as its id,
//! sent as a JSON string. Responses may arrive in any order, alone or inside
//! an array, from any of the manager's transports. All inbound payloads are
//! funnelled into one dispatcher task, which looks the id up in the pending
//! table (numbers and strings compare equal, so `7` answers `"7"`) and
//! settles that one request.
//!
//! Inbound data that cannot be correlated never fails a request. It is
//! logged, counted, and handed to [`RequestManager::on_protocol_error`]
//! subscribers:
//!
//! - a payload that is not JSON, or an entry that is not a response
//! - a response whose id nobody is waiting on (`UnrecognizedResponseId`)
//! - a response with neither `result` nor `error` (`MalformedResponse`;
//!   this one also rejects the request it names)
//! - an entry that does not decode but whose `id` names a pending request,
//!   such as an `error` member without a `code`; the request is rejected
//!   with `MalformedResponse`
//!
//! # Batching
//!
//! Between [`RequestManager::start_batch`] and
//! [`RequestManager::stop_batch`], requests are queued instead of sent, and
//! `stop_batch` transmits the queue as one array payload.
//!
//! # Cancellation
//!
//! There is none. Dropping a `ResponseFuture` leaves its entry in the table
//! until a response for it arrives.

use crate::batch::BatchState;
use crate::metrics::ManagerMetrics;
use crate::pending::{PendingRequest, PendingRequests, Settlement};
use crate::transport::{ErrorCallback, Subscribers, Transport};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wirecall_core::{codec, Error, Id, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, Result};

/// Lifecycle of a [`RequestManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Connecting,
    Ready,
    Closed,
}

impl ManagerState {
    /// Value recorded by the state gauge
    pub fn as_gauge(self) -> i64 {
        match self {
            ManagerState::Uninitialized => 0,
            ManagerState::Connecting => 1,
            ManagerState::Ready => 2,
            ManagerState::Closed => 3,
        }
    }
}

/// Future returned by [`RequestManager::request`]
///
/// Resolves with the response's `result` value, whatever it is (`null`
/// included), or fails with `Error::JsonRpc` carrying the server's error
/// object untouched.
#[must_use = "the response is lost unless the future is awaited"]
#[derive(Debug)]
pub struct ResponseFuture {
    id: Option<Id>,
    inner: ResponseInner,
}

#[derive(Debug)]
enum ResponseInner {
    Waiting(Settlement),
    Failed(Option<Error>),
}

impl ResponseFuture {
    fn waiting(id: Id, settlement: Settlement) -> Self {
        Self {
            id: Some(id),
            inner: ResponseInner::Waiting(settlement),
        }
    }

    fn failed(error: Error) -> Self {
        Self {
            id: None,
            inner: ResponseInner::Failed(Some(error)),
        }
    }

    /// Id the request went out with; `None` if it was never sent
    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            ResponseInner::Waiting(settlement) => {
                Pin::new(settlement).poll(cx).map(|received| match received {
                    Ok(outcome) => outcome,
                    // sender dropped: the manager went away
                    Err(_) => Err(Error::ConnectionClosed),
                })
            }
            ResponseInner::Failed(error) => Poll::Ready(Err(error
                .take()
                .unwrap_or_else(|| Error::Internal("response polled after completion".to_string())))),
        }
    }
}

/// State shared with the dispatcher task
struct Shared {
    pending: PendingRequests,
    diagnostics: Subscribers<Error>,
    metrics: Option<Arc<ManagerMetrics>>,
}

impl Shared {
    fn demux(&self, payload: &str) {
        let entries = match codec::split_payload(payload) {
            Ok(entries) => entries,
            Err(e) => {
                self.diagnose(e);
                return;
            }
        };

        for entry in entries {
            let rendered = entry.to_string();
            let raw_key = raw_response_key(&entry);
            match codec::decode_entry(entry) {
                Ok(JsonRpcMessage::Response(response)) => self.settle(response, rendered),
                Ok(JsonRpcMessage::Notification(notification)) => {
                    tracing::debug!(method = %notification.method, "ignoring notification");
                }
                Ok(JsonRpcMessage::Request(request)) => {
                    tracing::debug!(method = %request.method, id = %request.id, "ignoring server request");
                }
                Ok(JsonRpcMessage::Batch(_)) => {
                    self.diagnose(Error::Parse(format!("nested batch entry: {}", rendered)));
                }
                Err(e) => {
                    self.diagnose(e);
                    if let Some(pending) = raw_key.and_then(|key| self.pending.take(&key)) {
                        let error = Error::MalformedResponse(rendered);
                        self.diagnose(error.clone());
                        self.complete(pending, Err(error));
                    }
                }
            }
        }
    }

    fn settle(&self, response: JsonRpcResponse, rendered: String) {
        let key = response.id.to_key();
        let Some(pending) = self.pending.take(&key) else {
            self.diagnose(Error::UnrecognizedResponseId {
                id: key,
                outstanding: self.pending.ids(),
            });
            return;
        };

        let outcome = match (response.error, response.result) {
            (Some(error), _) => Err(Error::JsonRpc(error)),
            (None, Some(result)) => Ok(result),
            (None, None) => {
                let error = Error::MalformedResponse(rendered);
                self.diagnose(error.clone());
                Err(error)
            }
        };
        self.complete(pending, outcome);
    }

    fn complete(&self, pending: PendingRequest, outcome: Result<Value>) {
        let status = if outcome.is_ok() { "success" } else { "error" };
        let elapsed = pending.started.elapsed();
        tracing::debug!(
            id = %pending.id,
            method = %pending.method,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            "request settled"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_settlement(&pending.method, status, elapsed.as_secs_f64());
        }
        let id = pending.id.clone();
        if !pending.settle(outcome) {
            tracing::trace!(id = %id, "caller dropped its future");
        }
    }

    fn diagnose(&self, error: Error) {
        tracing::warn!(kind = error.kind(), error = %error, "protocol error");
        if let Some(metrics) = &self.metrics {
            metrics.record_protocol_error(error.kind());
        }
        self.diagnostics.emit(&error);
    }
}

/// Key of the `id` member of an entry shaped like a response
///
/// Entries carrying `method` are server traffic and never answer a request.
fn raw_response_key(entry: &Value) -> Option<String> {
    let object = entry.as_object()?;
    if object.contains_key("method") {
        return None;
    }
    object.get("id").and_then(Id::key_of)
}

async fn dispatch(shared: Arc<Shared>, mut inbound: mpsc::UnboundedReceiver<String>) {
    while let Some(payload) = inbound.recv().await {
        shared.demux(&payload);
    }
    tracing::debug!("dispatcher stopped");
}

/// JSON-RPC request manager over one or more transports
///
/// Requests always go out through the first transport; responses are
/// accepted from all of them.
///
/// ```rust,no_run
/// use wirecall_client::{RequestManager, Transport, WebSocketTransport};
///
/// # async fn run() -> wirecall_core::Result<()> {
/// let transports: Vec<Box<dyn Transport>> = vec![Box::new(WebSocketTransport::new("ws://localhost:8546"))];
/// let manager = RequestManager::new(transports)?;
/// manager.connect().await?;
///
/// let block = manager.request("eth_blockNumber", serde_json::json!([])).await?;
///
/// manager.start_batch();
/// let balance = manager.request("eth_getBalance", ("0x407d73d8a49eeb85d32cf465507dd71d507100c1", "latest"));
/// let nonce = manager.request("eth_getTransactionCount", ("0x407d73d8a49eeb85d32cf465507dd71d507100c1", "latest"));
/// manager.stop_batch()?;
/// let (balance, nonce) = (balance.await?, nonce.await?);
/// # Ok(())
/// # }
/// ```
pub struct RequestManager {
    transports: Vec<Box<dyn Transport>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    batch: Mutex<BatchState>,
    state: Mutex<ManagerState>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl RequestManager {
    /// Create a manager; at least one transport is required
    pub fn new(transports: Vec<Box<dyn Transport>>) -> Result<Self> {
        Self::with_metrics(transports, None)
    }

    pub(crate) fn with_metrics(
        transports: Vec<Box<dyn Transport>>,
        metrics: Option<Arc<ManagerMetrics>>,
    ) -> Result<Self> {
        if transports.is_empty() {
            return Err(Error::Config(
                "at least one transport is required".to_string(),
            ));
        }

        for (index, transport) in transports.iter().enumerate() {
            let metrics = metrics.clone();
            transport.on_error(Arc::new(move |error: &Error| {
                tracing::warn!(transport = index, kind = error.kind(), error = %error, "transport error");
                if let Some(metrics) = &metrics {
                    metrics.record_channel_error(error.kind());
                }
            }));
        }

        if let Some(metrics) = &metrics {
            metrics.update_state(ManagerState::Uninitialized);
        }

        Ok(Self {
            transports,
            shared: Arc::new(Shared {
                pending: PendingRequests::new(),
                diagnostics: Subscribers::new(),
                metrics,
            }),
            next_id: AtomicU64::new(0),
            batch: Mutex::new(BatchState::new()),
            state: Mutex::new(ManagerState::Uninitialized),
            dispatcher: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Connect every transport
    ///
    /// All transports connect concurrently; the first failure, in transport
    /// order, is returned and the manager goes back to `Uninitialized`.
    /// Calling this on a ready manager does nothing.
    #[tracing::instrument(skip(self), fields(transports = self.transports.len()))]
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        match self.state() {
            ManagerState::Ready => return Ok(()),
            ManagerState::Closed => return Err(Error::State("manager is closed".to_string())),
            _ => {}
        }

        self.start_dispatcher();
        self.set_state(ManagerState::Connecting);

        let results = join_all(self.transports.iter().map(|t| t.connect())).await;
        if let Some(error) = results.into_iter().find_map(|r| r.err()) {
            tracing::error!(error = %error, "transport connect failed");
            self.set_state(ManagerState::Uninitialized);
            return Err(error);
        }

        if !self.set_state(ManagerState::Ready) {
            return Err(Error::State("manager closed while connecting".to_string()));
        }
        tracing::info!("request manager ready");
        Ok(())
    }

    /// Issue a request
    ///
    /// The request is registered before this returns, so the returned future
    /// may be awaited at any time. A `null` params value is omitted from the
    /// envelope; params that fail to serialize yield a future that fails
    /// with `Error::Serialization`. After [`RequestManager::close`] nothing
    /// is sent and the future fails with `Error::ConnectionClosed`.
    pub fn request<P: Serialize>(&self, method: impl Into<String>, params: P) -> ResponseFuture {
        let method = method.into();
        if self.state() == ManagerState::Closed {
            tracing::debug!(method = %method, "request on closed manager");
            return ResponseFuture::failed(Error::ConnectionClosed);
        }
        let params = match serde_json::to_value(params) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(method = %method, error = %e, "params not serializable");
                return ResponseFuture::failed(Error::Serialization(e.to_string()));
            }
        };

        let id = Id::String(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
        let settlement = self.shared.pending.register(&id, &method);
        let request = JsonRpcRequest::new(method, params, id.clone());

        let payload = {
            let mut batch = self.batch.lock().unwrap_or_else(PoisonError::into_inner);
            if batch.is_open() {
                tracing::debug!(id = %id, method = %request.method, "request queued in batch");
                self.record_request(&request.method, true);
                batch.push(request);
                return ResponseFuture::waiting(id, settlement);
            }
            codec::encode_request(&request)
        };

        match payload {
            Ok(payload) => {
                tracing::debug!(id = %id, method = %request.method, "sending request");
                self.record_request(&request.method, false);
                self.designated().send_data(payload);
                ResponseFuture::waiting(id, settlement)
            }
            Err(e) => {
                self.shared.pending.take(&id.to_key());
                ResponseFuture::failed(e)
            }
        }
    }

    /// Start queueing requests; idempotent
    pub fn start_batch(&self) {
        let mut batch = self.batch.lock().unwrap_or_else(PoisonError::into_inner);
        if !batch.is_open() {
            tracing::debug!("batch opened");
        }
        batch.open();
    }

    /// Close the batch and send everything queued in it as one payload
    ///
    /// Fails with `Error::State` if no batch is open. An empty batch is
    /// closed without sending anything.
    #[tracing::instrument(skip(self))]
    pub fn stop_batch(&self) -> Result<()> {
        let requests = self
            .batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish()?;
        if requests.is_empty() {
            tracing::debug!("closing empty batch");
            return Ok(());
        }

        let payload = match codec::encode_batch(&requests) {
            Ok(payload) => payload,
            Err(e) => {
                for request in &requests {
                    if let Some(pending) = self.shared.pending.take(&request.id.to_key()) {
                        pending.settle(Err(e.clone()));
                    }
                }
                return Err(e);
            }
        };

        tracing::debug!(size = requests.len(), "sending batch");
        if let Some(metrics) = &self.shared.metrics {
            metrics.record_batch(requests.len() as u64);
        }
        self.designated().send_data(payload);
        Ok(())
    }

    /// Subscribe to channel errors of the designated transport
    pub fn on_error(&self, callback: ErrorCallback) {
        self.designated().on_error(callback);
    }

    /// Subscribe to inbound data that could not be correlated
    pub fn on_protocol_error(&self, callback: ErrorCallback) {
        self.shared.diagnostics.subscribe(callback);
    }

    /// Close every transport and fail all outstanding requests with
    /// `Error::ConnectionClosed`
    pub fn close(&self) {
        if !self.set_state(ManagerState::Closed) {
            return;
        }
        for transport in &self.transports {
            transport.close();
        }
        if let Some(dispatcher) = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            dispatcher.abort();
        }
        let failed = self.shared.pending.fail_all(Error::ConnectionClosed);
        tracing::info!(failed, "request manager closed");
    }

    pub fn state(&self) -> ManagerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Outstanding request ids, in numeric order
    pub fn pending_ids(&self) -> Vec<String> {
        self.shared.pending.ids()
    }

    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    pub fn is_batching(&self) -> bool {
        self.batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_open()
    }

    fn designated(&self) -> &dyn Transport {
        self.transports[0].as_ref()
    }

    /// Moves to `next` unless the manager is closed
    fn set_state(&self, next: ManagerState) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == ManagerState::Closed {
                return false;
            }
            *state = next;
        }
        if let Some(metrics) = &self.shared.metrics {
            metrics.update_state(next);
        }
        true
    }

    fn record_request(&self, method: &str, batched: bool) {
        if let Some(metrics) = &self.shared.metrics {
            metrics.record_request(method, batched);
        }
    }

    /// Subscribe to every transport and spawn the dispatcher, once
    fn start_dispatcher(&self) {
        let mut dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if dispatcher.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        for transport in &self.transports {
            let tx = tx.clone();
            transport.on_data(Arc::new(move |payload: &str| {
                let _ = tx.send(payload.to_string());
            }));
        }
        *dispatcher = Some(tokio::spawn(dispatch(self.shared.clone(), rx)));
    }
}

impl Drop for RequestManager {
    fn drop(&mut self) {
        if let Some(dispatcher) = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            dispatcher.abort();
        }
    }
}
