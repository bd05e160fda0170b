//! BLE Lock Controller
//!
//! Finds a named BLE lock, connects to it with bounded retries on
//! unreachable-device failures, subscribes to its control characteristic
//! and issues lock/unlock commands. A JSON-RPC 2.0 Unix socket exposes the
//! session to local clients.

pub mod backend;
pub mod config;
pub mod core;
pub mod protocol;
pub mod transport;

pub use core::{
    command::LockCommand,
    error::{BackendError, CommandError, SessionError, TransportError},
    session::SessionHandle,
    sink::EventSink,
    types::{SessionConfig, SessionSnapshot, SessionStatus},
};
