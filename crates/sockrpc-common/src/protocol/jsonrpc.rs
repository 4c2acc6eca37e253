//! JSON-RPC 2.0 Protocol Types
//!
//! This module implements the JSON-RPC 2.0 message shapes exchanged over the
//! socket.
//!
//! # Message Shapes
//!
//! - Request: `{"jsonrpc": "2.0", "id": 1, "method": "...", "params": [...]}`
//! - Response: `{"jsonrpc": "2.0", "id": 1, "result": ...}` or
//!   `{"jsonrpc": "2.0", "id": 1, "error": {"code": ..., "message": "...", "data": ...}}`
//! - Subscription push: `{"jsonrpc": "2.0", "method": "...", "params": {"subscription": "0x..", "result": ...}}`
//!
//! Requests always carry positional (array) params. Pushes carry no `id`,
//! which is what separates them from responses.
//!
//! # Error Codes
//!
//! Standard JSON-RPC 2.0 error codes:
//! - `-32700`: Parse error
//! - `-32600`: Invalid request
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32000` to `-32099`: Server error
//!
//! # Example
//!
//! ```
//! use sockrpc_common::protocol::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new(7, "eth_getBalance", vec![json!("0xabc"), json!("latest")]);
//!
//! let response = JsonRpcResponse::success(json!(7), json!("0x0"));
//! assert_eq!(response.request_id(), Some(request.id));
//!
//! let failed = JsonRpcResponse::error(json!(7), JsonRpcError::method_not_found());
//! assert!(failed.error.is_some());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::requests::{RequestId, RpcParams, SubscriptionId};

/// JSON-RPC protocol version sent with every request
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request identifier, unique for the provider's lifetime
    pub id: RequestId,
    /// Name of the method to invoke
    pub method: String,
    /// Positional parameter values
    pub params: RpcParams,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: RpcParams) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response
///
/// Exactly one of `result` and `error` is meaningful. A response whose
/// `result` is JSON `null` deserializes with `result: None` and no error,
/// which is still a success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    /// JSON-RPC version; tolerated when absent
    #[serde(default)]
    pub jsonrpc: String,
    /// Identifier of the request this answers (number, string, or null)
    pub id: Value,
    /// Result value on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error object on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// The numeric request id this response answers.
    ///
    /// Some servers echo ids back as strings; a decimal string is accepted.
    pub fn request_id(&self) -> Option<RequestId> {
        parse_request_id(&self.id)
    }

    /// Splits the response into the call's outcome.
    pub fn into_outcome(self) -> std::result::Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Reads a request id out of a raw `id` member.
pub fn parse_request_id(id: &Value) -> Option<RequestId> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Error code (standard codes are negative integers)
    pub code: i64,
    /// Short description of the error
    pub message: String,
    /// Additional data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC 2.0 error codes
/// Invalid JSON was received by the server
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid Request object
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist / is not available
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameter(s)
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error
pub const INTERNAL_ERROR: i64 = -32603;

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Create a parse error (-32700)
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// Create an invalid request error (-32600)
    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
    }

    /// Create a method not found error (-32601)
    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found")
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(msg: &str) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    /// Create an internal error (-32603)
    pub fn internal_error(msg: &str) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A message without an `id`: either a subscription push or a plain
/// server-initiated notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    #[serde(default)]
    pub jsonrpc: String,
    /// Notification method, e.g. `eth_subscription`
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcNotification {
    /// Builds a subscription push the way servers emit them.
    pub fn subscription(
        method: impl Into<String>,
        subscription: &SubscriptionId,
        result: Value,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params: serde_json::json!({
                "subscription": subscription.to_value(),
                "result": result,
            }),
        }
    }

    /// The subscription this push belongs to, if it is a subscription push.
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.params
            .get("subscription")
            .and_then(SubscriptionId::from_value)
    }

    /// The pushed payload (`params.result`), or `null` when absent.
    pub fn payload(&self) -> Value {
        self.params.get("result").cloned().unwrap_or(Value::Null)
    }
}
