//! Mock BLE backend for testing

use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::{AdapterEvent, BleBackend, EventSender};
use crate::core::error::{BackendError, BackendResult};
use crate::core::profile::{CONTROL_CHAR_UUID, LOCK_SERVICE_UUID};
use crate::core::types::{GattService, PeripheralId, ScanFilter, TransportHandle};

/// Operation issued against the mock, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    StartScan {
        device_name: String,
    },
    StopScan,
    Connect {
        peripheral: PeripheralId,
        auto_reconnect: bool,
        handle: TransportHandle,
    },
    Close(TransportHandle),
    DiscoverServices(TransportHandle),
    ReadCharacteristic {
        handle: TransportHandle,
        characteristic: Uuid,
    },
    WriteCharacteristic {
        handle: TransportHandle,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    WriteDescriptor {
        handle: TransportHandle,
        descriptor: Uuid,
        value: Vec<u8>,
    },
}

/// Internal state for the mock backend
#[derive(Debug)]
struct MockState {
    enabled: bool,
    permission: bool,
    should_fail_connect: bool,
    next_handle: u64,
    calls: Vec<BackendCall>,
    events: Option<EventSender>,
}

/// Mock BLE backend for testing
///
/// Records every issued call and lets tests play the platform's part by
/// injecting events through [`MockBleBackend::emit`].
#[derive(Debug, Clone)]
pub struct MockBleBackend {
    inner: Arc<Mutex<MockState>>,
}

impl MockBleBackend {
    /// Create a new mock backend with a powered radio and granted permission
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                enabled: true,
                permission: true,
                should_fail_connect: false,
                next_handle: 1,
                calls: Vec::new(),
                events: None,
            })),
        }
    }

    /// Configure the radio power state
    pub async fn set_enabled(&self, enabled: bool) {
        self.inner.lock().await.enabled = enabled;
    }

    /// Configure the permission check
    pub async fn set_permission(&self, granted: bool) {
        self.inner.lock().await.permission = granted;
    }

    /// Configure mock to fail connect requests synchronously
    pub async fn set_connect_failure(&self, should_fail: bool) {
        self.inner.lock().await.should_fail_connect = should_fail;
    }

    /// All calls issued so far
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Number of calls matching `pred`
    pub async fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.inner.lock().await.calls.iter().filter(|c| pred(c)).count()
    }

    /// Handle returned by the most recent connect request
    pub async fn last_handle(&self) -> Option<TransportHandle> {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .rev()
            .find_map(|call| match call {
                BackendCall::Connect { handle, .. } => Some(*handle),
                _ => None,
            })
    }

    /// Deliver an event as if the platform raised it
    ///
    /// Events are dropped when nothing has subscribed yet.
    pub async fn emit(&self, event: AdapterEvent) {
        if let Some(events) = &self.inner.lock().await.events {
            let _ = events.send(event);
        }
    }

    async fn record(&self, call: BackendCall) {
        self.inner.lock().await.calls.push(call);
    }
}

impl Default for MockBleBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Services exposed by a healthy lock peripheral
pub fn lock_profile() -> Vec<GattService> {
    vec![GattService {
        uuid: LOCK_SERVICE_UUID,
        characteristics: vec![CONTROL_CHAR_UUID],
    }]
}

impl BleBackend for MockBleBackend {
    async fn is_enabled(&self) -> BackendResult<bool> {
        Ok(self.inner.lock().await.enabled)
    }

    async fn has_permission(&self) -> bool {
        self.inner.lock().await.permission
    }

    async fn start_scan(&self, filter: &ScanFilter, events: EventSender) -> BackendResult<()> {
        let mut state = self.inner.lock().await;
        state.events = Some(events);
        state.calls.push(BackendCall::StartScan {
            device_name: filter.device_name.clone(),
        });
        Ok(())
    }

    async fn stop_scan(&self) -> BackendResult<()> {
        self.record(BackendCall::StopScan).await;
        Ok(())
    }

    async fn connect(
        &self,
        peripheral: &PeripheralId,
        auto_reconnect: bool,
        events: EventSender,
    ) -> BackendResult<TransportHandle> {
        let mut state = self.inner.lock().await;
        if state.should_fail_connect {
            return Err(BackendError::ConnectFailed("Mock connect failure".into()));
        }

        let handle = TransportHandle(state.next_handle);
        state.next_handle += 1;
        state.events = Some(events);
        state.calls.push(BackendCall::Connect {
            peripheral: peripheral.clone(),
            auto_reconnect,
            handle,
        });
        Ok(handle)
    }

    async fn close(&self, handle: TransportHandle) -> BackendResult<()> {
        self.record(BackendCall::Close(handle)).await;
        Ok(())
    }

    async fn discover_services(&self, handle: TransportHandle) -> BackendResult<()> {
        self.record(BackendCall::DiscoverServices(handle)).await;
        Ok(())
    }

    async fn read_characteristic(
        &self,
        handle: TransportHandle,
        _service: Uuid,
        characteristic: Uuid,
    ) -> BackendResult<()> {
        self.record(BackendCall::ReadCharacteristic {
            handle,
            characteristic,
        })
        .await;
        Ok(())
    }

    async fn write_characteristic(
        &self,
        handle: TransportHandle,
        _service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> BackendResult<()> {
        self.record(BackendCall::WriteCharacteristic {
            handle,
            characteristic,
            value: value.to_vec(),
        })
        .await;
        Ok(())
    }

    async fn write_descriptor(
        &self,
        handle: TransportHandle,
        _service: Uuid,
        _characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> BackendResult<()> {
        self.record(BackendCall::WriteDescriptor {
            handle,
            descriptor,
            value: value.to_vec(),
        })
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{GattStatus, LinkState};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_mock_backend_records_calls() {
        let backend = MockBleBackend::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let filter = ScanFilter {
            device_name: "MyBLEDevice".into(),
        };
        backend.start_scan(&filter, tx.clone()).await.unwrap();
        backend.stop_scan().await.unwrap();

        let peripheral = PeripheralId("AA:BB:CC:DD:EE:FF".into());
        let handle = backend.connect(&peripheral, false, tx).await.unwrap();
        backend.close(handle).await.unwrap();

        assert_eq!(
            backend.calls().await,
            vec![
                BackendCall::StartScan {
                    device_name: "MyBLEDevice".into()
                },
                BackendCall::StopScan,
                BackendCall::Connect {
                    peripheral,
                    auto_reconnect: false,
                    handle
                },
                BackendCall::Close(handle),
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_backend_handles_are_fresh() {
        let backend = MockBleBackend::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let peripheral = PeripheralId("AA:BB:CC:DD:EE:FF".into());

        let first = backend.connect(&peripheral, false, tx.clone()).await.unwrap();
        let second = backend.connect(&peripheral, false, tx).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(backend.last_handle().await, Some(second));
    }

    #[tokio::test]
    async fn test_mock_backend_connect_failure() {
        let backend = MockBleBackend::new();
        backend.set_connect_failure(true).await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = backend
            .connect(&PeripheralId("AA:BB:CC:DD:EE:FF".into()), false, tx)
            .await;
        assert!(result.is_err());
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_backend_emits_to_subscriber() {
        let backend = MockBleBackend::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let peripheral = PeripheralId("AA:BB:CC:DD:EE:FF".into());
        let handle = backend.connect(&peripheral, false, tx).await.unwrap();

        let event = AdapterEvent::ConnectionStateChanged {
            handle,
            status: GattStatus::SUCCESS,
            state: LinkState::Connected,
        };
        backend.emit(event.clone()).await;

        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn test_mock_backend_radio_and_permission() {
        let backend = MockBleBackend::new();
        assert!(backend.is_enabled().await.unwrap());
        assert!(backend.has_permission().await);

        backend.set_enabled(false).await;
        backend.set_permission(false).await;
        assert!(!backend.is_enabled().await.unwrap());
        assert!(!backend.has_permission().await);
    }
}
