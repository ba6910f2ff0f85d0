//! Transport abstraction
//!
//! A transport moves opaque string payloads between the request manager and
//! a JSON-RPC server. It knows nothing about ids, batching or correlation.
//!
//! # Contract
//!
//! - [`Transport::connect`] resolves once payloads can flow, or fails with
//!   `Error::Connection`
//! - [`Transport::send_data`] enqueues a payload and returns immediately;
//!   delivery failures are reported through [`Transport::on_error`]
//! - every inbound payload is handed to all data subscribers, in the order
//!   they subscribed
//! - [`Transport::close`] may be called any number of times
//!
//! Two implementations ship with the crate: [`WebSocketTransport`] and
//! [`MessageChannelTransport`].

mod channel;
mod websocket;

pub use channel::{
    message_channel, ChannelReply, ChannelRequest, MessageChannelTransport, MessagePeer,
    MessagePort, DEFAULT_TIMEOUT,
};
pub use websocket::WebSocketTransport;

use crate::connection_state::ConnectionState;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use wirecall_core::{Error, Result};

/// Callback invoked with each inbound payload
pub type DataCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback invoked with each channel failure
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// A bidirectional channel carrying JSON-RPC payloads as strings
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the channel
    async fn connect(&self) -> Result<()>;

    /// Enqueue a payload for delivery
    fn send_data(&self, payload: String);

    /// Subscribe to inbound payloads
    fn on_data(&self, callback: DataCallback);

    /// Subscribe to channel failures
    fn on_error(&self, callback: ErrorCallback);

    /// Release the channel
    fn close(&self);

    /// Current connection state
    fn state(&self) -> ConnectionState;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn connect(&self) -> Result<()> {
        (**self).connect().await
    }

    fn send_data(&self, payload: String) {
        (**self).send_data(payload)
    }

    fn on_data(&self, callback: DataCallback) {
        (**self).on_data(callback)
    }

    fn on_error(&self, callback: ErrorCallback) {
        (**self).on_error(callback)
    }

    fn close(&self) {
        (**self).close()
    }

    fn state(&self) -> ConnectionState {
        (**self).state()
    }
}

/// Ordered list of callbacks
///
/// `emit` works on a snapshot of the list, so a callback may subscribe
/// further callbacks without deadlocking; those are only called from the
/// next `emit` on.
pub struct Subscribers<T: ?Sized> {
    callbacks: Mutex<Vec<Arc<dyn Fn(&T) + Send + Sync>>>,
}

impl<T: ?Sized> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, callback: Arc<dyn Fn(&T) + Send + Sync>) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    /// Call every subscriber with `value`, in subscription order
    pub fn emit(&self, value: &T) {
        let snapshot = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in snapshot {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}
