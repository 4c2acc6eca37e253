pub mod error;
pub mod jsonrpc;
pub mod messages;
pub mod requests;


pub use error::{FrameError, Result, SockRpcError};
pub use jsonrpc::{
    parse_request_id, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
pub use messages::InboundMessage;
pub use requests::{MethodName, RequestId, RequestIdGenerator, RpcParams, SubscriptionId};
