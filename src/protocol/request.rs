//! Request message types

use serde::{Deserialize, Serialize};

/// Request messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "params")]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// Present the shared-secret key to unlock commands
    Authorize(AuthorizeParams),

    /// Scan for the configured device and connect to it
    Connect,

    /// Tear down scan and link
    Disconnect,

    Lock,

    Unlock,

    /// Get session status
    GetStatus,
}

/// Parameters for authorize request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizeParams {
    /// SHA3-256 of the shared secret (hex-encoded 32 bytes = 64 hex chars)
    pub key: String,
}

impl Request {
    /// Whether the request needs a live authorization
    pub fn requires_authorization(&self) -> bool {
        matches!(self, Request::Lock | Request::Unlock)
    }
}
