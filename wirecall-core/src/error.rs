//! Error types for wirecall
//!
//! Two types live here:
//!
//! - **Error**: everything that can go wrong on the client side, including a
//!   remote JSON-RPC error delivered back to the caller
//! - **JsonRpcErrorData**: the wire-format `error` object of a response
//!
//! # Error Categories
//!
//! - **Connection**: a transport failed to connect (bad target, refused)
//! - **Channel**: a connected transport failed afterwards (abnormal close,
//!   delivery crash); reported through the transport's error subscribers
//! - **Protocol**: `UnrecognizedResponseId`, `MalformedResponse` and `Parse`,
//!   raised while demultiplexing inbound payloads
//! - **State**: an operation called in the wrong manager state
//! - **JsonRpc**: the server answered with an error object, kept verbatim
//!
//! # Examples
//!
//! ```rust
//! use wirecall_core::{Error, JsonRpcErrorData};
//!
//! let remote = Error::JsonRpc(JsonRpcErrorData::new(-32000, "header not found"));
//! assert_eq!(remote.rpc_error().map(|e| e.code), Some(-32000));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for wirecall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Client-side error type
///
/// `Clone` so a single channel failure can be handed to every error
/// subscriber of a transport.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Error object returned by the server, unmodified
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcErrorData),

    /// A transport could not be connected
    #[error("Connection error: {0}")]
    Connection(String),

    /// A connected transport failed
    #[error("Channel error: {0}")]
    Channel(String),

    /// A response arrived for an id nobody is waiting on
    #[error("Received an unrecognized response id: {id}. Valid ids are: {}", .outstanding.join(","))]
    UnrecognizedResponseId {
        /// Normalized id of the offending response
        id: String,
        /// Ids still outstanding when the response arrived
        outstanding: Vec<String>,
    },

    /// A response carried neither `result` nor `error`
    #[error("Malformed JSON-RPC response object: {0}")]
    MalformedResponse(String),

    /// An inbound payload or batch entry could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operation not valid in the current state
    #[error("State error: {0}")]
    State(String),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No reply arrived in time
    #[error("Request timeout")]
    Timeout,

    /// The transport was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The remote error object, if this is a JSON-RPC error
    pub fn rpc_error(&self) -> Option<&JsonRpcErrorData> {
        match self {
            Error::JsonRpc(data) => Some(data),
            _ => None,
        }
    }

    /// True for the diagnostics raised while demultiplexing inbound data
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::UnrecognizedResponseId { .. } | Error::MalformedResponse(_) | Error::Parse(_)
        )
    }

    /// Short label used for metrics attributes
    pub fn kind(&self) -> &'static str {
        match self {
            Error::JsonRpc(_) => "json_rpc",
            Error::Connection(_) => "connection",
            Error::Channel(_) => "channel",
            Error::UnrecognizedResponseId { .. } => "unrecognized_response_id",
            Error::MalformedResponse(_) => "malformed_response",
            Error::Parse(_) => "parse",
            Error::State(_) => "state",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Timeout => "timeout",
            Error::ConnectionClosed => "connection_closed",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// JSON-RPC 2.0 error object
///
/// Received errors are passed to callers exactly as decoded: `code`,
/// `message` and `data` are never rewritten.
///
/// ```rust
/// use wirecall_core::JsonRpcErrorData;
/// use serde_json::json;
///
/// let error = JsonRpcErrorData::with_data(3, "execution reverted", json!("0x08c379a0"));
/// assert_eq!(error.to_string(), "[3] execution reverted");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Integer error code
    pub code: i64,
    /// Short description
    pub message: String,
    /// Optional server-defined detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// -32700
    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    /// -32600
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(-32600, msg)
    }

    /// -32601
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(-32601, format!("Method not found: {}", method.into()))
    }

    /// -32602
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }

    /// -32603
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(-32603, msg)
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}
