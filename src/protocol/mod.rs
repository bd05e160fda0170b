//! Protocol message definitions

pub mod jsonrpc;
pub mod notification;
pub mod request;
pub mod response;

pub use {
    jsonrpc::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId},
    notification::{
        ConnectionFailedParams, Notification, StatusChangedParams, ValueNotifiedParams,
    },
    request::{AuthorizeParams, Request},
    response::{AckResponse, AuthorizedResponse, Response, StatusResponse},
};
