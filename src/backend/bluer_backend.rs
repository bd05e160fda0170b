//! BlueZ implementation of the BLE backend

use bluer::{
    Adapter, AdapterEvent as BluezEvent, Address, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport, ErrorKind,
    gatt::remote::{Characteristic, Service},
};
use futures::StreamExt;
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::{AdapterEvent, BleBackend, EventSender},
    core::{
        error::{BackendError, BackendResult},
        profile::{CCCD_UUID, ENABLE_NOTIFICATION_VALUE},
        types::{GattService, GattStatus, LinkState, PeripheralId, ScanFilter, TransportHandle},
    },
};

type CharacteristicKey = (Uuid, Uuid);

/// State of one open transport
struct Link {
    device: bluer::Device,
    events: EventSender,
    characteristics: HashMap<CharacteristicKey, Characteristic>,
    notify: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    fn abort_all(&mut self) {
        for task in self.tasks.drain(..).chain(self.notify.take()) {
            task.abort();
        }
    }
}

/// BLE backend talking to bluetoothd over D-Bus
pub struct BluerBackend {
    adapter: Adapter,
    next_handle: AtomicU64,
    links: Arc<Mutex<HashMap<TransportHandle, Link>>>,
    discovery: Mutex<Option<JoinHandle<()>>>,
}

impl BluerBackend {
    /// Open a session on the named adapter, or the default one
    pub async fn new(adapter_name: Option<&str>) -> BackendResult<Self> {
        let session = bluer::Session::new()
            .await
            .map_err(|e| BackendError::AdapterUnavailable(e.to_string()))?;

        let adapter = match adapter_name {
            Some(name) => session.adapter(name),
            None => session.default_adapter().await,
        }
        .map_err(|e| BackendError::AdapterUnavailable(e.to_string()))?;

        info!("Using BLE adapter: {}", adapter.name());

        Ok(Self {
            adapter,
            next_handle: AtomicU64::new(1),
            links: Arc::new(Mutex::new(HashMap::new())),
            discovery: Mutex::new(None),
        })
    }

    async fn link_events(
        &self,
        handle: TransportHandle,
    ) -> BackendResult<(bluer::Device, EventSender)> {
        let links = self.links.lock().await;
        let link = links.get(&handle).ok_or(BackendError::UnknownHandle)?;
        Ok((link.device.clone(), link.events.clone()))
    }

    async fn characteristic(
        &self,
        handle: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> BackendResult<(Characteristic, EventSender)> {
        let links = self.links.lock().await;
        let link = links.get(&handle).ok_or(BackendError::UnknownHandle)?;
        let found = link
            .characteristics
            .get(&(service, characteristic))
            .cloned()
            .ok_or(BackendError::CharacteristicNotFound(characteristic))?;
        Ok((found, link.events.clone()))
    }

    /// Run `work` as a task owned by the link, aborted on close
    async fn spawn_for<F>(&self, handle: TransportHandle, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(work);
        match self.links.lock().await.get_mut(&handle) {
            Some(link) => link.track(task),
            None => task.abort(),
        }
    }
}

/// Status reported for a failed connect, 133 for errors worth retrying
fn connect_status(err: &bluer::Error) -> GattStatus {
    match err.kind {
        ErrorKind::ConnectionAttemptFailed | ErrorKind::Failed => GattStatus::DEVICE_UNREACHABLE,
        _ => GattStatus::FAILURE,
    }
}

fn operation_status<T>(result: &bluer::Result<T>) -> GattStatus {
    match result {
        Ok(_) => GattStatus::SUCCESS,
        Err(_) => GattStatus::FAILURE,
    }
}

/// LE-only discovery narrowed to the target name
fn discovery_filter(filter: &ScanFilter) -> DiscoveryFilter {
    DiscoveryFilter {
        transport: DiscoveryTransport::Le,
        pattern: Some(filter.device_name.clone()),
        ..Default::default()
    }
}

/// Status of a descriptor write
///
/// bluetoothd refuses writes to descriptors it manages itself. When the
/// notification subscription is already open that refusal is not a failure.
fn descriptor_write_status(result: &bluer::Result<()>, subscribed: bool) -> GattStatus {
    match result {
        Ok(()) => GattStatus::SUCCESS,
        Err(e) if subscribed && e.kind == ErrorKind::NotPermitted => {
            debug!("Descriptor write refused by bluetoothd, relying on subscription");
            GattStatus::SUCCESS
        }
        Err(_) => GattStatus::FAILURE,
    }
}

fn platform(err: bluer::Error) -> BackendError {
    BackendError::Platform(err.to_string())
}

fn parse_address(peripheral: &PeripheralId) -> BackendResult<Address> {
    peripheral
        .0
        .parse()
        .map_err(|_| BackendError::InvalidAddress(peripheral.0.clone()))
}

async fn write_remote_descriptor(
    remote: &Characteristic,
    descriptor: Uuid,
    value: &[u8],
) -> bluer::Result<()> {
    for candidate in remote.descriptors().await? {
        if candidate.uuid().await? == descriptor {
            return candidate.write(value).await;
        }
    }

    Err(bluer::Error {
        kind: ErrorKind::NotFound,
        message: format!("descriptor {descriptor} not found"),
    })
}

async fn collect_services(
    services: Vec<Service>,
) -> bluer::Result<(Vec<GattService>, HashMap<CharacteristicKey, Characteristic>)> {
    let mut discovered = Vec::new();
    let mut cache = HashMap::new();

    for service in services {
        let service_uuid = service.uuid().await?;
        let mut characteristics = Vec::new();

        for characteristic in service.characteristics().await? {
            let uuid = characteristic.uuid().await?;
            characteristics.push(uuid);
            cache.insert((service_uuid, uuid), characteristic);
        }

        discovered.push(GattService {
            uuid: service_uuid,
            characteristics,
        });
    }

    Ok((discovered, cache))
}

impl BleBackend for BluerBackend {
    async fn is_enabled(&self) -> BackendResult<bool> {
        self.adapter.is_powered().await.map_err(platform)
    }

    async fn has_permission(&self) -> bool {
        match self.adapter.address().await {
            Ok(_) => true,
            Err(e) if matches!(e.kind, ErrorKind::NotPermitted | ErrorKind::NotAuthorized) => {
                warn!("Adapter access denied: {}", e);
                false
            }
            Err(e) => {
                debug!("Adapter address query failed: {}", e);
                true
            }
        }
    }

    async fn start_scan(&self, filter: &ScanFilter, events: EventSender) -> BackendResult<()> {
        self.adapter
            .set_discovery_filter(discovery_filter(filter))
            .await
            .map_err(|e| BackendError::ScanFailed(e.to_string()))?;

        let discover = self
            .adapter
            .discover_devices()
            .await
            .map_err(|e| BackendError::ScanFailed(e.to_string()))?;

        let adapter = self.adapter.clone();
        debug!(device = %filter.device_name, "Discovery started");

        let task = tokio::spawn(async move {
            tokio::pin!(discover);

            while let Some(event) = discover.next().await {
                let BluezEvent::DeviceAdded(address) = event else {
                    continue;
                };

                let name = match adapter.device(address) {
                    Ok(device) => device.name().await.ok().flatten(),
                    Err(_) => None,
                };

                let result = AdapterEvent::ScanResult {
                    peripheral: PeripheralId(address.to_string()),
                    name,
                };
                if events.send(result).is_err() {
                    return;
                }
            }

            warn!("Discovery stream ended");
            let _ = events.send(AdapterEvent::ScanFailed { code: -1 });
        });

        if let Some(previous) = self.discovery.lock().await.replace(task) {
            previous.abort();
        }

        Ok(())
    }

    async fn stop_scan(&self) -> BackendResult<()> {
        if let Some(task) = self.discovery.lock().await.take() {
            task.abort();
            debug!("Discovery stopped");
        }
        Ok(())
    }

    async fn connect(
        &self,
        peripheral: &PeripheralId,
        auto_reconnect: bool,
        events: EventSender,
    ) -> BackendResult<TransportHandle> {
        let address = parse_address(peripheral)?;
        let device = self.adapter.device(address).map_err(platform)?;

        if auto_reconnect {
            // Trusted devices are reconnected by bluetoothd
            device.set_trusted(true).await.map_err(platform)?;
        }

        // Subscribe before connecting so no link drop is missed
        let device_events = device.events().await.map_err(platform)?;
        let handle = TransportHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));

        let connect_task = {
            let device = device.clone();
            let events = events.clone();
            tokio::spawn(async move {
                let status = match device.connect().await {
                    Ok(()) => GattStatus::SUCCESS,
                    Err(e) => {
                        warn!(%handle, "Connect failed: {}", e);
                        connect_status(&e)
                    }
                };
                let state = if status.is_success() {
                    LinkState::Connected
                } else {
                    LinkState::Disconnected
                };
                let _ = events.send(AdapterEvent::ConnectionStateChanged {
                    handle,
                    status,
                    state,
                });
            })
        };

        let watch_task = {
            let events = events.clone();
            tokio::spawn(async move {
                tokio::pin!(device_events);

                while let Some(event) = device_events.next().await {
                    if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                        let _ = events.send(AdapterEvent::ConnectionStateChanged {
                            handle,
                            status: GattStatus::PEER_TERMINATED,
                            state: LinkState::Disconnected,
                        });
                        return;
                    }
                }
            })
        };

        self.links.lock().await.insert(
            handle,
            Link {
                device,
                events,
                characteristics: HashMap::new(),
                notify: None,
                tasks: vec![connect_task, watch_task],
            },
        );

        debug!(%peripheral, %handle, "Transport opened");
        Ok(handle)
    }

    async fn close(&self, handle: TransportHandle) -> BackendResult<()> {
        let Some(mut link) = self.links.lock().await.remove(&handle) else {
            debug!(%handle, "Close of unknown transport");
            return Ok(());
        };

        link.abort_all();

        // The link is already gone; nothing waits on the platform disconnect
        tokio::spawn(async move {
            if let Err(e) = link.device.disconnect().await {
                debug!(%handle, "Disconnect: {}", e);
            }
        });

        Ok(())
    }

    async fn discover_services(&self, handle: TransportHandle) -> BackendResult<()> {
        let (device, events) = self.link_events(handle).await?;
        let links = self.links.clone();

        self.spawn_for(handle, async move {
            let collected = match device.services().await {
                Ok(services) => collect_services(services).await,
                Err(e) => Err(e),
            };

            let (status, services) = match collected {
                Ok((services, cache)) => {
                    if let Some(link) = links.lock().await.get_mut(&handle) {
                        link.characteristics = cache;
                    }
                    (GattStatus::SUCCESS, services)
                }
                Err(e) => {
                    warn!(%handle, "Service discovery failed: {}", e);
                    (GattStatus::FAILURE, Vec::new())
                }
            };

            let _ = events.send(AdapterEvent::ServicesDiscovered {
                handle,
                status,
                services,
            });
        })
        .await;

        Ok(())
    }

    async fn read_characteristic(
        &self,
        handle: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> BackendResult<()> {
        let (remote, events) = self.characteristic(handle, service, characteristic).await?;

        self.spawn_for(handle, async move {
            let result = remote.read().await;
            let status = operation_status(&result);
            let _ = events.send(AdapterEvent::CharacteristicRead {
                handle,
                characteristic,
                status,
                value: result.unwrap_or_default(),
            });
        })
        .await;

        Ok(())
    }

    async fn write_characteristic(
        &self,
        handle: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> BackendResult<()> {
        let (remote, events) = self.characteristic(handle, service, characteristic).await?;
        let value = value.to_vec();

        self.spawn_for(handle, async move {
            let status = operation_status(&remote.write(&value).await);
            let _ = events.send(AdapterEvent::CharacteristicWrite {
                handle,
                characteristic,
                status,
            });
        })
        .await;

        Ok(())
    }

    async fn write_descriptor(
        &self,
        handle: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> BackendResult<()> {
        let (remote, events) = self.characteristic(handle, service, characteristic).await?;
        let value = value.to_vec();
        let subscribe = descriptor == CCCD_UUID && value == ENABLE_NOTIFICATION_VALUE;

        let task = tokio::spawn(async move {
            // Subscribe before the write so early notifications are delivered
            let stream = if subscribe {
                match remote.notify().await {
                    Ok(stream) => Some(stream),
                    Err(e) => {
                        warn!(%handle, "Subscribing to notifications failed: {}", e);
                        let _ = events.send(AdapterEvent::DescriptorWrite {
                            handle,
                            descriptor,
                            status: GattStatus::FAILURE,
                        });
                        return;
                    }
                }
            } else {
                None
            };

            let written = write_remote_descriptor(&remote, descriptor, &value).await;
            let status = descriptor_write_status(&written, stream.is_some());
            if let (Err(e), false) = (&written, status.is_success()) {
                warn!(%handle, %descriptor, "Descriptor write failed: {}", e);
            }
            let _ = events.send(AdapterEvent::DescriptorWrite {
                handle,
                descriptor,
                status,
            });

            let Some(stream) = stream.filter(|_| status.is_success()) else {
                return;
            };

            tokio::pin!(stream);
            while let Some(value) = stream.next().await {
                let changed = AdapterEvent::CharacteristicChanged {
                    handle,
                    characteristic,
                    value,
                };
                if events.send(changed).is_err() {
                    return;
                }
            }
            debug!(%handle, "Notification stream ended");
        });

        let mut links = self.links.lock().await;
        let Some(link) = links.get_mut(&handle) else {
            task.abort();
            return Err(BackendError::UnknownHandle);
        };

        if subscribe {
            if let Some(previous) = link.notify.replace(task) {
                previous.abort();
            }
        } else {
            link.track(task);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(kind: ErrorKind) -> bluer::Error {
        bluer::Error {
            kind,
            message: String::new(),
        }
    }

    #[test]
    fn test_connect_status_mapping() {
        assert_eq!(
            connect_status(&error(ErrorKind::ConnectionAttemptFailed)),
            GattStatus::DEVICE_UNREACHABLE
        );
        assert_eq!(
            connect_status(&error(ErrorKind::Failed)),
            GattStatus::DEVICE_UNREACHABLE
        );
        assert_eq!(
            connect_status(&error(ErrorKind::NotAuthorized)),
            GattStatus::FAILURE
        );
    }

    #[test]
    fn test_operation_status() {
        assert_eq!(operation_status(&Ok(())), GattStatus::SUCCESS);
        assert_eq!(
            operation_status::<()>(&Err(error(ErrorKind::NotPermitted))),
            GattStatus::FAILURE
        );
    }

    #[test]
    fn test_discovery_filter_matches_device_name() {
        let filter = discovery_filter(&ScanFilter {
            device_name: "MyBLEDevice".to_string(),
        });
        assert_eq!(filter.transport, DiscoveryTransport::Le);
        assert_eq!(filter.pattern.as_deref(), Some("MyBLEDevice"));
    }

    #[test]
    fn test_descriptor_write_status() {
        assert_eq!(descriptor_write_status(&Ok(()), false), GattStatus::SUCCESS);
        assert_eq!(descriptor_write_status(&Ok(()), true), GattStatus::SUCCESS);

        let refused = Err(error(ErrorKind::NotPermitted));
        assert_eq!(descriptor_write_status(&refused, true), GattStatus::SUCCESS);
        assert_eq!(descriptor_write_status(&refused, false), GattStatus::FAILURE);

        let missing = Err(error(ErrorKind::NotFound));
        assert_eq!(descriptor_write_status(&missing, true), GattStatus::FAILURE);
        assert_eq!(
            descriptor_write_status(&Err(error(ErrorKind::Failed)), true),
            GattStatus::FAILURE
        );
    }

    #[test]
    fn test_parse_address() {
        let address = parse_address(&PeripheralId("AA:BB:CC:DD:EE:FF".into())).unwrap();
        assert_eq!(address.to_string(), "AA:BB:CC:DD:EE:FF");

        assert_eq!(
            parse_address(&PeripheralId("MyBLEDevice".into())),
            Err(BackendError::InvalidAddress("MyBLEDevice".into()))
        );
    }
}
