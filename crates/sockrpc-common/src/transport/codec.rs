use bytes::Bytes;
use serde_json::Value;

use crate::protocol::error::Result;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// JSON codec for outbound payloads.
///
/// Messages go on the wire as bare JSON with no delimiter; the receiving side
/// finds boundaries structurally (see [`ChunkFramer`](super::ChunkFramer)).
/// Response and notification encoders exist for the server side of tests and
/// tooling.
///
/// # Example
///
/// ```
/// use sockrpc_common::transport::JsonCodec;
/// use sockrpc_common::protocol::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new(1, "eth_chainId", vec![]);
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// let decoded = JsonCodec::decode_request(&encoded).unwrap();
/// assert_eq!(decoded.method, "eth_chainId");
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a request to bytes
    pub fn encode_request(request: &JsonRpcRequest) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(request)?))
    }

    /// Decode a request from bytes
    pub fn decode_request(data: &[u8]) -> Result<JsonRpcRequest> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Encode a response to bytes
    pub fn encode_response(response: &JsonRpcResponse) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(response)?))
    }

    /// Encode a notification to bytes
    pub fn encode_notification(notification: &JsonRpcNotification) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(notification)?))
    }

    /// Encode any JSON value, e.g. a batch of responses
    pub fn encode_value(value: &Value) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }
}
