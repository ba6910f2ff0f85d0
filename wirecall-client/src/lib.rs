//! JSON-RPC 2.0 request manager with pluggable transports
//!
//! The crate is built around three pieces:
//!
//! - [`Transport`]: moves opaque string payloads. [`WebSocketTransport`] and
//!   [`MessageChannelTransport`] are provided; anything implementing the
//!   trait can be plugged in.
//! - [`RequestManager`]: assigns ids, keeps track of outstanding requests,
//!   batches on demand and settles each [`ResponseFuture`] with its response,
//!   however responses are ordered or grouped on the wire.
//! - [`Provider`]: the minimal call interface higher layers depend on.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wirecall_client::{ManagerBuilder, WebSocketTransport};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ManagerBuilder::new()
//!         .transport(WebSocketTransport::new("ws://localhost:8546"))
//!         .build()?;
//!     manager.connect().await?;
//!
//!     let height = manager.request("eth_blockNumber", json!([])).await?;
//!     println!("block: {}", height);
//!
//!     manager.start_batch();
//!     let chain = manager.request("eth_chainId", json!([]));
//!     let gas = manager.request("eth_gasPrice", json!([]));
//!     manager.stop_batch()?;
//!     println!("chain {} gas {}", chain.await?, gas.await?);
//!
//!     manager.close();
//!     Ok(())
//! }
//! ```
//!
//! # Errors
//!
//! A server error reaches the caller as `Error::JsonRpc` with code, message
//! and data untouched. Channel failures go to [`RequestManager::on_error`]
//! subscribers, and inbound data that matches no request goes to
//! [`RequestManager::on_protocol_error`] subscribers; neither fails an
//! in-flight request.

mod batch;
mod builder;
mod connection_state;
mod manager;
mod metrics;
mod pending;
mod provider;
mod transport;

pub use batch::BatchState;
pub use builder::ManagerBuilder;
pub use connection_state::{ConnectionState, StateCell};
pub use manager::{ManagerState, RequestManager, ResponseFuture};
pub use metrics::ManagerMetrics;
pub use pending::{PendingRequest, PendingRequests};
pub use provider::{Provider, RequestArguments};
pub use transport::{
    message_channel, ChannelReply, ChannelRequest, DataCallback, ErrorCallback,
    MessageChannelTransport, MessagePeer, MessagePort, Subscribers, Transport,
    WebSocketTransport, DEFAULT_TIMEOUT,
};

pub use wirecall_core::{Error, Id, JsonRpcErrorData, Result};
