//! Encoding and decoding of JSON-RPC payloads
//!
//! Transports move opaque strings. Everything that turns those strings into
//! envelopes and back goes through this module, so the manager never touches
//! `serde_json` directly for wire data.
//!
//! # Inbound payloads
//!
//! A server may answer with a single object or with an array (a batch
//! reply). [`split_payload`] normalizes both into a list of raw values, and
//! [`decode_entry`] decodes one value at a time so a broken entry does not
//! stop its neighbours from being processed.
//!
//! # Examples
//!
//! ```rust
//! use wirecall_core::{codec, JsonRpcRequest, Id};
//!
//! let requests = vec![
//!     JsonRpcRequest::new("eth_blockNumber", Some(serde_json::json!([])), Id::from("0")),
//!     JsonRpcRequest::new("eth_chainId", Some(serde_json::json!([])), Id::from("1")),
//! ];
//! let payload = codec::encode_batch(&requests).unwrap();
//! assert!(payload.starts_with('['));
//!
//! let entries = codec::split_payload(&payload).unwrap();
//! assert_eq!(entries.len(), 2);
//! ```

use crate::error::{Error, Result};
use crate::types::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use serde::{Deserialize, Serialize};

/// Encode any serializable message to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a single request
pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

/// Encode requests as one JSON array payload, preserving order
pub fn encode_batch(requests: &[JsonRpcRequest]) -> Result<String> {
    encode(&requests)
}

/// Encode a response; used by tests and mock peers
pub fn encode_response(resp: &JsonRpcResponse) -> Result<String> {
    encode(resp)
}

/// Decode a JSON string into a specific type
pub fn decode_as<'de, T: Deserialize<'de>>(data: &'de str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a JSON string into a single envelope or a batch
pub fn decode(data: &str) -> Result<JsonRpcMessage> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| Error::Parse(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::Parse(e.to_string()))
}

/// Parse an inbound payload and normalize it to a list of entries
///
/// An array yields its items, anything else yields itself. Fails with
/// [`Error::Parse`] only if the payload is not JSON at all.
pub fn split_payload(data: &str) -> Result<Vec<serde_json::Value>> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| Error::Parse(format!("{}: {}", e, data)))?;
    Ok(match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    })
}

/// Decode one entry of an inbound payload
///
/// Nested arrays are rejected: a batch reply is flat.
pub fn decode_entry(value: serde_json::Value) -> Result<JsonRpcMessage> {
    if value.is_array() {
        return Err(Error::Parse(format!("nested batch entry: {}", value)));
    }
    let rendered = value.to_string();
    serde_json::from_value(value).map_err(|e| Error::Parse(format!("{}: {}", e, rendered)))
}
