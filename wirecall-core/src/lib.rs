//! # wirecall-core
//!
//! Shared building blocks for the wirecall JSON-RPC 2.0 client:
//!
//! - [`types`]: request, notification and response envelopes and [`Id`]
//! - [`codec`]: string encoding of requests and batches, inbound payload
//!   splitting and per-entry decoding
//! - [`error`]: the crate-wide [`Error`] and the wire-level
//!   [`JsonRpcErrorData`]
//! - [`observability`]: opt-in logging, tracing and metrics export
//!
//! The request manager and the transports live in `wirecall-client`.

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, JsonRpcErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    Id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION,
};
