//! Platform BLE backend abstraction layer

pub mod ble_backend;
pub mod bluer_backend;
pub mod mock_backend;

pub use ble_backend::{AdapterEvent, BleBackend, EventSender};
pub use bluer_backend::BluerBackend;
pub use mock_backend::{BackendCall, MockBleBackend};
