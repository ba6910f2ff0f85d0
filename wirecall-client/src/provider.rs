//! Provider interface
//!
//! The narrow request-in, value-out surface that higher layers (wallet
//! libraries, contract bindings) program against.

use crate::manager::RequestManager;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wirecall_core::Result;

/// Arguments of a single call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Something that can answer JSON-RPC calls
///
/// Failures reported by the server surface as `Error::JsonRpc` with the
/// code, message and data exactly as received.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn request(&self, args: RequestArguments) -> Result<Value>;
}

#[async_trait]
impl Provider for RequestManager {
    /// Missing params are sent as an empty array
    async fn request(&self, args: RequestArguments) -> Result<Value> {
        let params = args.params.unwrap_or_else(|| Value::Array(Vec::new()));
        RequestManager::request(self, args.method, params).await
    }
}
