//! JSON-RPC 2.0 wire types
//!
//! The structures in this module map one-to-one onto the objects exchanged
//! with a JSON-RPC 2.0 server (https://www.jsonrpc.org/specification):
//!
//! 1. **Request**: a method call that expects a response
//! 2. **Notification**: a method call without an `id`; nothing comes back
//! 3. **Response**: the outcome of a request, carrying `result` or `error`
//!
//! # Request IDs
//!
//! Servers are free to echo an id back as a number even when it was sent as
//! a string (and vice versa). Correlation therefore never compares [`Id`]
//! values directly; it compares their normalized key, see [`Id::to_key`].

use crate::error::JsonRpcErrorData;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// JSON-RPC protocol version string
pub const JSONRPC_VERSION: &str = "2.0";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// JSON-RPC 2.0 request ID
///
/// Serialized untagged, so `Id::String("7".into())` goes on the wire as
/// `"7"` and `Id::Number(7)` as `7`.
///
/// ```rust
/// use wirecall_core::Id;
///
/// let sent: Id = "7".into();
/// let echoed: Id = 7i64.into();
///
/// assert_ne!(sent, echoed);
/// assert_eq!(sent.to_key(), echoed.to_key());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// String identifier
    String(String),
    /// Numeric identifier
    Number(i64),
    /// Null identifier, used by servers that could not read the request id
    Null,
}

impl Id {
    /// Normalized string form used as the correlation key
    ///
    /// Strings are taken as-is and numbers are rendered in decimal, so a
    /// response id of `7` and one of `"7"` map to the same key.
    pub fn to_key(&self) -> String {
        match self {
            Id::String(s) => s.clone(),
            Id::Number(n) => n.to_string(),
            Id::Null => "null".to_string(),
        }
    }

    /// Correlation key of a raw `id` member that may not decode as an [`Id`]
    ///
    /// Integral floats such as `0.0` map to the key of the integer. Anything
    /// else that is not a string or an integer has no key.
    pub fn key_of(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(i.to_string())
                } else if let Some(u) = n.as_u64() {
                    Some(u.to_string())
                } else {
                    let f = n.as_f64()?;
                    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15)
                        .then(|| format!("{}", f as i64))
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::Null
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

/// JSON-RPC 2.0 request message
///
/// ```rust
/// use wirecall_core::{JsonRpcRequest, Id};
/// use serde_json::json;
///
/// let req = JsonRpcRequest::new("eth_call", Some(json!(["0x00"])), Id::from("0"));
/// assert_eq!(req.jsonrpc, "2.0");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Id echoed back by the server in the matching response
    pub id: Id,
    /// Name of the remote method
    pub method: String,
    /// Positional (array) or named (object) parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new request with `jsonrpc` set to "2.0"
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>, id: Id) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification message
///
/// Notifications carry no `id`. The client core accepts them on the inbound
/// side but does not dispatch them anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always "2.0"
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Method or event name
    pub method: String,
    /// Optional payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Create a new notification
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message
///
/// `result` is decoded so that a *present* member always yields `Some`, even
/// when its value is `null`. Only a missing member yields `None`. This keeps
/// `{"id":1,"result":null}` (a successful call returning nothing) apart from
/// `{"id":1}` (a malformed response).
///
/// ```rust
/// use wirecall_core::JsonRpcResponse;
///
/// let ok: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
/// assert!(ok.is_success());
///
/// let bad: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
/// assert!(!bad.is_success() && !bad.is_error());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Normally "2.0"; tolerated when missing
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Present on success
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<serde_json::Value>,
    /// Present on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
    /// Id of the request this answers
    #[serde(default)]
    pub id: Id,
}

/// Maps any present value, including `null`, to `Some`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    /// Create a successful response
    pub fn success(result: serde_json::Value, id: Id) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(error: JsonRpcErrorData, id: Id) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// True if a `result` member was present
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// True if an `error` member was present
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Any single JSON-RPC envelope, or a batch of raw values
///
/// Variants are tried in order, so an object with a `method` and an `id` is
/// a request, one with a `method` and no `id` is a notification, and
/// everything else that is an object is treated as a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A method call expecting a response
    Request(JsonRpcRequest),
    /// A method call without a response
    Notification(JsonRpcNotification),
    /// The outcome of a request
    Response(JsonRpcResponse),
    /// A JSON array; items are decoded one by one so a bad item does not
    /// poison its neighbours
    Batch(Vec<serde_json::Value>),
}

impl JsonRpcMessage {
    pub fn is_request(&self) -> bool {
        matches!(self, JsonRpcMessage::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, JsonRpcMessage::Notification(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, JsonRpcMessage::Response(_))
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, JsonRpcMessage::Batch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_display() {
        assert_eq!(Id::String("test".to_string()).to_string(), "\"test\"");
        assert_eq!(Id::Number(42).to_string(), "42");
        assert_eq!(Id::Null.to_string(), "null");
    }

    #[test]
    fn test_id_key_normalizes_numbers_and_strings() {
        assert_eq!(Id::Number(7).to_key(), "7");
        assert_eq!(Id::String("7".into()).to_key(), "7");
        assert_eq!(Id::Null.to_key(), "null");
    }

    #[test]
    fn test_key_of_raw_ids() {
        assert_eq!(Id::key_of(&json!("0")), Some("0".to_string()));
        assert_eq!(Id::key_of(&json!(7)), Some("7".to_string()));
        assert_eq!(Id::key_of(&json!(0.0)), Some("0".to_string()));
        assert_eq!(Id::key_of(&json!(3.0)), Some("3".to_string()));
        assert_eq!(Id::key_of(&json!(1.5)), None);
        assert_eq!(Id::key_of(&json!(null)), None);
        assert_eq!(Id::key_of(&json!({"id": 1})), None);
    }

    #[test]
    fn test_request_serialization_uses_string_id() {
        let req = JsonRpcRequest::new("eth_call", Some(json!(["0x01"])), Id::from("3"));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": "3", "method": "eth_call", "params": ["0x01"]})
        );
    }

    #[test]
    fn test_response_result_null_is_present() {
        let resp: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": "1", "result": null})).unwrap();
        assert_eq!(resp.result, Some(serde_json::Value::Null));
        assert!(resp.is_success());
    }

    #[test]
    fn test_response_without_result_or_error() {
        let resp: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 4})).unwrap();
        assert!(!resp.is_success());
        assert!(!resp.is_error());
        assert_eq!(resp.id, Id::Number(4));
    }

    #[test]
    fn test_response_error_preserves_data() {
        let resp: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": 3, "message": "execution reverted", "data": "0x08c379a0"}
        }))
        .unwrap();
        let error = resp.error.unwrap();
        assert_eq!(error.code, 3);
        assert_eq!(error.message, "execution reverted");
        assert_eq!(error.data, Some(json!("0x08c379a0")));
    }

    #[test]
    fn test_message_variant_detection() {
        let req: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": "m"})).unwrap();
        assert!(req.is_request());

        let notif: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "eth_subscription"})).unwrap();
        assert!(notif.is_notification());

        let resp: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": false})).unwrap();
        assert!(resp.is_response());
    }
}
