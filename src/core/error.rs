//! Error types for the lock controller

use thiserror::Error;

use super::types::{GattStatus, SessionStatus};

/// Result type for platform backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for lock/unlock commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by the platform BLE backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Unknown transport handle")]
    UnknownHandle,

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(uuid::Uuid),

    #[error("Invalid peripheral address: {0}")]
    InvalidAddress(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Errors of the connection lifecycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Bluetooth radio is disabled")]
    RadioDisabled,

    #[error("Bluetooth permission not granted")]
    PermissionDenied,

    #[error("Device not found before scan timeout")]
    ScanTimeout,

    #[error("Scan failed with code {0}")]
    ScanFailed(i32),

    #[error("Device unreachable (status {0}), connection deadline elapsed")]
    TransientConnectFailure(GattStatus),

    #[error("Connection closed with status {0}")]
    TerminalConnectFailure(GattStatus),

    #[error("Service discovery failed: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("Session already active ({0})")]
    AlreadyActive(SessionStatus),

    #[error("Session task has shut down")]
    Shutdown,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors returned synchronously by lock/unlock
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Not connected")]
    NotConnected,

    #[error("Not authorized")]
    Unauthorized,

    #[error("Session task has shut down")]
    Shutdown,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors related to the control socket transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid authorization key")]
    InvalidAuthorizationKey,
}
