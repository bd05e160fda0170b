//! Platform BLE adapter trait definition

use tokio::sync::mpsc;
use trait_variant::make;
use uuid::Uuid;

use crate::core::error::BackendResult;
use crate::core::types::{
    GattService, GattStatus, LinkState, PeripheralId, ScanFilter, TransportHandle,
};

/// Asynchronous event delivered by the platform
///
/// Link events carry the handle they belong to so the session can drop
/// events of transports it has already closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    ScanResult {
        peripheral: PeripheralId,
        name: Option<String>,
    },
    ScanFailed {
        code: i32,
    },
    ConnectionStateChanged {
        handle: TransportHandle,
        status: GattStatus,
        state: LinkState,
    },
    ServicesDiscovered {
        handle: TransportHandle,
        status: GattStatus,
        services: Vec<GattService>,
    },
    CharacteristicRead {
        handle: TransportHandle,
        characteristic: Uuid,
        status: GattStatus,
        value: Vec<u8>,
    },
    CharacteristicWrite {
        handle: TransportHandle,
        characteristic: Uuid,
        status: GattStatus,
    },
    DescriptorWrite {
        handle: TransportHandle,
        descriptor: Uuid,
        status: GattStatus,
    },
    CharacteristicChanged {
        handle: TransportHandle,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// Channel the backend posts its events into
pub type EventSender = mpsc::UnboundedSender<AdapterEvent>;

/// Abstraction over the platform BLE stack (BlueZ in production)
///
/// Every operation only *issues* a request. Completion is reported
/// later as an [`AdapterEvent`] on the sender handed to `start_scan` or
/// `connect`.
#[make(Send)]
pub trait BleBackend: Send + Sync + 'static {
    /// Whether the radio is powered
    async fn is_enabled(&self) -> BackendResult<bool>;

    /// Whether the process may scan and connect
    async fn has_permission(&self) -> bool;

    /// Start a scan filtered on the advertised name
    async fn start_scan(&self, filter: &ScanFilter, events: EventSender) -> BackendResult<()>;

    async fn stop_scan(&self) -> BackendResult<()>;

    /// Issue a transport connect request
    ///
    /// The returned handle is owned by the caller until passed to `close`.
    async fn connect(
        &self,
        peripheral: &PeripheralId,
        auto_reconnect: bool,
        events: EventSender,
    ) -> BackendResult<TransportHandle>;

    /// Close and release a transport handle
    async fn close(&self, handle: TransportHandle) -> BackendResult<()>;

    async fn discover_services(&self, handle: TransportHandle) -> BackendResult<()>;

    async fn read_characteristic(
        &self,
        handle: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> BackendResult<()>;

    async fn write_characteristic(
        &self,
        handle: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> BackendResult<()>;

    async fn write_descriptor(
        &self,
        handle: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> BackendResult<()>;
}
