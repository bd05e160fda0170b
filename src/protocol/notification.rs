//! Notification message types (server-to-client events)

use serde::{Deserialize, Serialize};

use crate::core::types::SessionStatus;

/// Server-to-client notifications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "params")]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    /// Session status changed
    StatusChanged(StatusChangedParams),

    /// Text received from the lock's control characteristic
    ValueNotified(ValueNotifiedParams),

    /// A connect attempt ended without reaching the device
    ConnectionFailed(ConnectionFailedParams),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChangedParams {
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueNotifiedParams {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionFailedParams {
    pub reason: String,
}

impl Notification {
    pub fn status_changed(status: SessionStatus) -> Self {
        Notification::StatusChanged(StatusChangedParams { status })
    }

    pub fn value_notified(text: impl Into<String>) -> Self {
        Notification::ValueNotified(ValueNotifiedParams { text: text.into() })
    }

    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Notification::ConnectionFailed(ConnectionFailedParams {
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_changed_notification() {
        let notif = Notification::status_changed(SessionStatus::Connecting);
        let json = serde_json::to_string(&notif).unwrap();
        assert_eq!(
            json,
            r#"{"method":"status_changed","params":{"status":"connecting"}}"#
        );

        let deserialized: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, notif);
    }

    #[test]
    fn test_value_notified_notification() {
        let json = serde_json::to_string(&Notification::value_notified("unlocked")).unwrap();
        assert!(json.contains(r#""method":"value_notified""#));
        assert!(json.contains(r#""text":"unlocked""#));
    }

    #[test]
    fn test_connection_failed_notification() {
        let json = serde_json::to_string(&Notification::connection_failed(
            "Device not found before scan timeout",
        ))
        .unwrap();
        assert!(json.contains(r#""method":"connection_failed""#));
        assert!(json.contains(r#""reason":"Device not found"#));
    }
}
