//! Domain types for the lock session

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of the session, as reported to the event sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionStatus {
    Disconnected = 0,
    Scanning = 1,
    Connecting = 2,
    /// Link is up and service discovery is running
    Connected = 3,
    /// Notifications are active and commands are accepted
    Ready = 4,
}

impl TryFrom<u8> for SessionStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0 => Ok(SessionStatus::Disconnected),
            1 => Ok(SessionStatus::Scanning),
            2 => Ok(SessionStatus::Connecting),
            3 => Ok(SessionStatus::Connected),
            4 => Ok(SessionStatus::Ready),
            _ => Err(()),
        }
    }
}

impl From<SessionStatus> for u8 {
    fn from(status: SessionStatus) -> Self {
        status as u8
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Scanning => "scanning",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Platform identifier of an advertising peripheral (a BD address on BlueZ)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralId(pub String);

impl std::fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to one transport connection issued by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub u64);

impl std::fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// GATT status code reported by the platform with each completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GattStatus(pub i32);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0);
    /// Remote user terminated the link
    pub const PEER_TERMINATED: GattStatus = GattStatus(19);
    /// Local host terminated the link
    pub const LOCAL_TERMINATED: GattStatus = GattStatus(22);
    /// Peripheral momentarily did not respond
    pub const DEVICE_UNREACHABLE: GattStatus = GattStatus(133);
    pub const FAILURE: GattStatus = GattStatus(257);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Whether the code is the transient failure worth a retry
    pub fn is_transient(self) -> bool {
        self == Self::DEVICE_UNREACHABLE
    }
}

impl std::fmt::Display for GattStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport link state carried by connection-state events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Filter applied to scan results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    pub device_name: String,
}

/// One GATT service as reported by service discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// Single GATT operation issued against the fixed profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacteristicOperation {
    Read,
    Write(Vec<u8>),
    EnableNotify,
}

/// Characteristic command value object, completed within one callback round-trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicCommand {
    pub operation: CharacteristicOperation,
    pub characteristic_id: Uuid,
}

/// Timing and reconnect policy of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub scan_timeout: Duration,
    /// Pause between stopping the scan and opening the transport
    pub settle_delay: Duration,
    /// Measured from the first connect request of an attempt
    pub connect_deadline: Duration,
    pub auto_reconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_millis(3000),
            settle_delay: Duration::from_millis(500),
            connect_deadline: Duration::from_millis(5000),
            auto_reconnect: false,
        }
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peripheral: Option<PeripheralId>,
    pub timed_out: bool,
}

/// Authorization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    Unauthorized,
    Authorized { expires_at: tokio::time::Instant },
}

impl AuthorizationState {
    pub fn is_authorized(&self) -> bool {
        match self {
            AuthorizationState::Unauthorized => false,
            AuthorizationState::Authorized { expires_at } => {
                tokio::time::Instant::now() < *expires_at
            }
        }
    }
}

/// Session identifier for control socket clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(uuid::Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_byte_conversion() {
        for status in [
            SessionStatus::Disconnected,
            SessionStatus::Scanning,
            SessionStatus::Connecting,
            SessionStatus::Connected,
            SessionStatus::Ready,
        ] {
            assert_eq!(SessionStatus::try_from(u8::from(status)), Ok(status));
        }
        assert!(SessionStatus::try_from(9).is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Connecting).unwrap();
        assert_eq!(json, r#""connecting""#);
    }

    #[test]
    fn test_gatt_status_classification() {
        assert!(GattStatus::SUCCESS.is_success());
        assert!(GattStatus::DEVICE_UNREACHABLE.is_transient());
        assert!(!GattStatus::FAILURE.is_transient());
        assert!(!GattStatus::PEER_TERMINATED.is_success());
    }

    #[test]
    fn test_default_timings() {
        let config = SessionConfig::default();
        assert_eq!(config.scan_timeout, Duration::from_millis(3000));
        assert_eq!(config.settle_delay, Duration::from_millis(500));
        assert_eq!(config.connect_deadline, Duration::from_millis(5000));
    }

    #[test]
    fn test_client_ids_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
    }
}
