//! wirecall: a transport-agnostic JSON-RPC 2.0 client core
//!
//! This crate re-exports the workspace members so applications can depend on
//! one crate:
//!
//! - **wirecall-core** (as [`core`]): wire types, codec, errors,
//!   observability bootstrap
//! - **wirecall-client** (as [`client`]): transports, request manager,
//!   provider interface
//!
//! ```rust,no_run
//! use wirecall::{ManagerBuilder, Provider, RequestArguments, WebSocketTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ManagerBuilder::new()
//!         .transport(WebSocketTransport::new("ws://localhost:8546"))
//!         .build()?;
//!     manager.connect().await?;
//!
//!     let provider: &dyn Provider = &manager;
//!     let accounts = provider.request(RequestArguments::new("eth_accounts", None)).await?;
//!     println!("{}", accounts);
//!     Ok(())
//! }
//! ```

pub use wirecall_client as client;
pub use wirecall_core as core;

pub use wirecall_client::{
    message_channel, ConnectionState, ManagerBuilder, ManagerState, MessageChannelTransport,
    Provider, RequestArguments, RequestManager, ResponseFuture, Transport, WebSocketTransport,
};
pub use wirecall_core::{
    init_observability, shutdown_observability, Error, Id, JsonRpcErrorData, ObservabilityConfig,
    Result,
};
