//! Response message types

use serde::{Deserialize, Serialize};

use crate::core::types::SessionSnapshot;

/// Response messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Response {
    /// Status response
    Status(StatusResponse),

    /// Authorize response
    Authorized(AuthorizedResponse),

    /// Plain acknowledgement for connect, disconnect, lock and unlock
    Ack(AckResponse),
}

/// Response for get_status request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
    pub session: SessionSnapshot,
}

/// Response for authorize request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizedResponse {
    pub status: String,
    pub expires_in_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok(session: SessionSnapshot) -> Self {
        Self {
            status: "ok".to_string(),
            session,
        }
    }
}

impl AuthorizedResponse {
    pub fn ok(expires_in_secs: u64) -> Self {
        Self {
            status: "ok".to_string(),
            expires_in_secs,
        }
    }
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
