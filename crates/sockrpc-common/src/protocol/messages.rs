//! Inbound message classification.
//!
//! Every complete value that comes off the socket is either a response to
//! one of our calls or a notification pushed by the server. The two are told
//! apart by the presence of a non-null `id`.

use serde_json::Value;

use super::error::{Result, SockRpcError};
use super::jsonrpc::{parse_request_id, JsonRpcNotification, JsonRpcResponse};
use super::requests::RequestId;

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Answer to a request, correlated by id
    Response(JsonRpcResponse),
    /// Server push; never settles a pending call
    Notification(JsonRpcNotification),
    /// Response-shaped object with a usable id whose body does not parse,
    /// such as a string in place of the error object
    Malformed { id: RequestId, reason: String },
}

impl InboundMessage {
    /// Classifies a single decoded JSON object.
    ///
    /// An error response with a `null` id (the server could not read our
    /// request's id) is still a response; it simply correlates with nothing.
    pub fn classify(value: Value) -> Result<Self> {
        let Value::Object(map) = &value else {
            return Err(SockRpcError::InvalidResponse(format!(
                "expected a JSON object, got {}",
                kind_of(&value)
            )));
        };

        let has_id = map.get("id").is_some_and(|id| !id.is_null());
        if has_id || map.contains_key("result") || map.contains_key("error") {
            let id = map.get("id").and_then(parse_request_id);
            return match (serde_json::from_value(value), id) {
                (Ok(response), _) => Ok(InboundMessage::Response(response)),
                (Err(err), Some(id)) => Ok(InboundMessage::Malformed {
                    id,
                    reason: err.to_string(),
                }),
                (Err(err), None) => Err(err.into()),
            };
        }
        if map.contains_key("method") {
            return Ok(InboundMessage::Notification(serde_json::from_value(value)?));
        }

        Err(SockRpcError::InvalidResponse(
            "object is neither a response nor a notification".into(),
        ))
    }

    /// Classifies a decoded value that may be a batch.
    ///
    /// Each element of a batch array is classified on its own so one bad
    /// element does not hide the others.
    pub fn classify_all(value: Value) -> Vec<Result<Self>> {
        match value {
            Value::Array(items) => items.into_iter().map(Self::classify).collect(),
            other => vec![Self::classify(other)],
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
