//! Session task: single owner of the connection lifecycle
//!
//! Every command, adapter event and timer firing is processed on one task,
//! so status, transport handle and timers are never mutated concurrently.
//! [`SessionHandle`] is the cloneable front end talking to it.

use std::sync::Arc;
use tokio::{
    select,
    sync::{mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    backend::{AdapterEvent, BleBackend, EventSender},
    core::{
        command::{self, LockCommand},
        connector::{ConnectionAttempt, LinkLossDecision},
        error::{BackendResult, CommandError, CommandResult, SessionError, SessionResult},
        listener,
        profile::{CCCD_UUID, ENABLE_NOTIFICATION_VALUE, LOCK_SERVICE_UUID},
        scanner::{ScanAttempt, ScanOutcome},
        sink::EventSink,
        state::SessionStateMachine,
        timer::{TimerFired, TimerKind, TimerSet},
        types::{
            CharacteristicCommand, CharacteristicOperation, GattService, GattStatus, LinkState,
            PeripheralId, SessionConfig, SessionSnapshot, SessionStatus, TransportHandle,
        },
    },
};

const INBOX_CAPACITY: usize = 32;

#[derive(Debug)]
enum SessionCommand {
    Connect {
        device_name: String,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Command {
        command: LockCommand,
        reply: oneshot::Sender<CommandResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Handle to a running session task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inbox: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Spawn the session task
    ///
    /// The task stops once every handle is dropped.
    pub fn spawn<B: BleBackend>(
        backend: Arc<B>,
        sink: Arc<dyn EventSink>,
        config: SessionConfig,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        tokio::spawn(SessionActor::new(backend, sink, config, inbox_rx).run());
        Self { inbox: inbox_tx }
    }

    /// Start scanning for `device_name` and connect to it once found
    ///
    /// Returns once the scan has been issued; progress is reported through
    /// the event sink.
    pub async fn connect(&self, device_name: impl Into<String>) -> SessionResult<()> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(SessionCommand::Connect {
                device_name: device_name.into(),
                reply: tx,
            })
            .await
            .map_err(|_| SessionError::Shutdown)?;
        rx.await.map_err(|_| SessionError::Shutdown)?
    }

    /// Cancel timers, close the transport and force `Disconnected`
    ///
    /// Safe to call when already disconnected.
    pub async fn disconnect(&self) -> SessionResult<()> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(SessionCommand::Disconnect { reply: tx })
            .await
            .map_err(|_| SessionError::Shutdown)?;
        rx.await.map_err(|_| SessionError::Shutdown)
    }

    pub async fn lock(&self) -> CommandResult<()> {
        self.command(LockCommand::Lock).await
    }

    pub async fn unlock(&self) -> CommandResult<()> {
        self.command(LockCommand::Unlock).await
    }

    /// Issue a lock command; fails with `NotConnected` unless the session is ready
    pub async fn command(&self, command: LockCommand) -> CommandResult<()> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(SessionCommand::Command { command, reply: tx })
            .await
            .map_err(|_| CommandError::Shutdown)?;
        rx.await.map_err(|_| CommandError::Shutdown)?
    }

    pub async fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(SessionCommand::Snapshot { reply: tx })
            .await
            .map_err(|_| SessionError::Shutdown)?;
        rx.await.map_err(|_| SessionError::Shutdown)
    }
}

/// Data of one connect request, torn down on disconnect or failure
#[derive(Debug)]
struct Session {
    target_device_name: String,
    scan: ScanAttempt,
    scan_in_progress: bool,
    peripheral: Option<PeripheralId>,
    connection: Option<ConnectionAttempt>,
    transport_handle: Option<TransportHandle>,
}

impl Session {
    fn new(target_device_name: String) -> Self {
        Self {
            scan: ScanAttempt::new(target_device_name.clone()),
            target_device_name,
            scan_in_progress: false,
            peripheral: None,
            connection: None,
            transport_handle: None,
        }
    }
}

struct SessionActor<B: BleBackend> {
    backend: Arc<B>,
    sink: Arc<dyn EventSink>,
    config: SessionConfig,
    state: SessionStateMachine,
    session: Option<Session>,
    /// Bumped on every new attempt and teardown; stale timers compare against it
    generation: u64,
    timers: TimerSet,
    inbox: mpsc::Receiver<SessionCommand>,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<AdapterEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
}

impl<B: BleBackend> SessionActor<B> {
    fn new(
        backend: Arc<B>,
        sink: Arc<dyn EventSink>,
        config: SessionConfig,
        inbox: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        Self {
            backend,
            sink,
            config,
            state: SessionStateMachine::new(),
            session: None,
            generation: 0,
            timers: TimerSet::new(timer_tx),
            inbox,
            events_tx,
            events_rx,
            timer_rx,
        }
    }

    async fn run(mut self) {
        info!("Session task started");

        loop {
            select! {
                biased;

                cmd = self.inbox.recv() => {
                    let Some(cmd) = cmd else {
                        info!("All session handles dropped, shutting down");
                        break;
                    };
                    self.handle_command(cmd).await;
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                }
                Some(fired) = self.timer_rx.recv() => {
                    self.handle_timer(fired).await;
                }
            }
        }

        self.teardown().await;
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Connect { device_name, reply } => {
                let result = self.begin_scan(device_name).await;
                let _ = reply.send(result);
            }
            SessionCommand::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            SessionCommand::Command { command, reply } => {
                let result = self.issue_lock_command(command).await;
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn handle_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::ScanResult { peripheral, name } => {
                self.on_scan_result(peripheral, name).await;
            }
            AdapterEvent::ScanFailed { code } => {
                self.on_scan_failed(code).await;
            }
            AdapterEvent::ConnectionStateChanged {
                handle,
                status,
                state,
            } => {
                if self.is_current(handle) {
                    self.on_connection_state_change(handle, status, state).await;
                }
            }
            AdapterEvent::ServicesDiscovered {
                handle,
                status,
                services,
            } => {
                if self.is_current(handle) {
                    self.on_services_discovered(handle, status, services).await;
                }
            }
            AdapterEvent::CharacteristicRead {
                handle,
                characteristic,
                status,
                value,
            } => {
                if self.is_current(handle) {
                    self.on_characteristic_read(handle, characteristic, status, value)
                        .await;
                }
            }
            AdapterEvent::CharacteristicWrite {
                handle,
                characteristic,
                status,
            } => {
                if self.is_current(handle) {
                    if status.is_success() {
                        debug!(%characteristic, "Characteristic write complete");
                    } else {
                        warn!(%characteristic, %status, "Characteristic write failed");
                    }
                }
            }
            AdapterEvent::DescriptorWrite {
                handle,
                descriptor,
                status,
            } => {
                if self.is_current(handle)
                    && listener::notifications_enabled(descriptor, status)
                    && self.transition(SessionStatus::Ready)
                {
                    info!("Notifications enabled, session ready");
                }
            }
            AdapterEvent::CharacteristicChanged {
                handle,
                characteristic,
                value,
            } => {
                if self.is_current(handle) {
                    self.on_characteristic_changed(characteristic, &value);
                }
            }
        }
    }

    async fn handle_timer(&mut self, fired: TimerFired) {
        if fired.generation != self.generation || self.session.is_none() {
            debug!(?fired, current = self.generation, "Dropping stale timer");
            return;
        }
        self.timers.clear(fired.kind);

        match fired.kind {
            TimerKind::ScanTimeout => self.on_scan_timeout().await,
            TimerKind::Settle => self.open_transport().await,
            TimerKind::ConnectDeadline => {
                if let Some(connection) = self.session.as_mut().and_then(|s| s.connection.as_mut())
                {
                    connection.latch_timeout();
                }
            }
        }
    }

    // Scan controller

    async fn begin_scan(&mut self, device_name: String) -> SessionResult<()> {
        if self.state.is_active() {
            return Err(SessionError::AlreadyActive(self.state.status()));
        }

        if !self.backend.has_permission().await {
            error!("Bluetooth permission is not granted");
            return Err(SessionError::PermissionDenied);
        }

        if !self.backend.is_enabled().await? {
            warn!("Bluetooth adapter is not enabled");
            return Err(SessionError::RadioDisabled);
        }

        self.generation += 1;
        let session = Session::new(device_name);
        let filter = session.scan.filter().clone();
        self.session = Some(session);
        self.transition(SessionStatus::Scanning);

        if let Err(e) = self
            .backend
            .start_scan(&filter, self.events_tx.clone())
            .await
        {
            error!("Failed to start scan: {}", e);
            self.end_attempt(SessionError::Backend(e.clone())).await;
            return Err(e.into());
        }

        if let Some(session) = self.session.as_mut() {
            session.scan_in_progress = true;
        }
        self.timers.arm(
            TimerKind::ScanTimeout,
            self.generation,
            self.config.scan_timeout,
        );

        info!(device = %filter.device_name, "Start scanning");
        Ok(())
    }

    async fn on_scan_result(&mut self, peripheral: PeripheralId, name: Option<String>) {
        let Some(session) = self.session.as_mut() else {
            debug!(%peripheral, "Scan result without session");
            return;
        };

        if session.scan.on_scan_result(name.as_deref()) == ScanOutcome::Ignored {
            return;
        }

        info!(%peripheral, device = %session.target_device_name, "Device found");
        session.scan_in_progress = false;
        session.peripheral = Some(peripheral);

        self.timers.cancel(TimerKind::ScanTimeout);
        if let Err(e) = self.backend.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        self.transition(SessionStatus::Connecting);
        self.timers.arm(
            TimerKind::Settle,
            self.generation,
            self.config.settle_delay,
        );
    }

    async fn on_scan_failed(&mut self, code: i32) {
        error!(code, "Scan failed");

        if self.session.as_ref().is_some_and(|s| s.scan_in_progress) {
            self.end_attempt(SessionError::ScanFailed(code)).await;
        }
    }

    async fn on_scan_timeout(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        if !session.scan_in_progress || session.scan.is_found() {
            return;
        }

        info!(device = %session.target_device_name, "Device not found");
        self.end_attempt(SessionError::ScanTimeout).await;
    }

    // Connection controller

    async fn open_transport(&mut self) {
        if self.state.status() != SessionStatus::Connecting {
            debug!(status = %self.state.status(), "Not opening transport");
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(peripheral) = session.peripheral.clone() else {
            return;
        };

        if session.connection.is_none() {
            session.connection = Some(ConnectionAttempt::new(
                peripheral.clone(),
                Instant::now(),
                self.config.connect_deadline,
            ));
            self.timers.arm(
                TimerKind::ConnectDeadline,
                self.generation,
                self.config.connect_deadline,
            );
        }

        self.issue_connect(peripheral).await;
    }

    async fn issue_connect(&mut self, peripheral: PeripheralId) {
        if let Some(stale) = self
            .session
            .as_mut()
            .and_then(|s| s.transport_handle.take())
        {
            self.close_transport(stale).await;
        }

        match self
            .backend
            .connect(
                &peripheral,
                self.config.auto_reconnect,
                self.events_tx.clone(),
            )
            .await
        {
            Ok(handle) => {
                info!(%peripheral, %handle, "Connect requested");
                if let Some(session) = self.session.as_mut() {
                    session.transport_handle = Some(handle);
                }
            }
            Err(e) => {
                error!(%peripheral, "Connect request failed: {}", e);
                self.end_attempt(SessionError::Backend(e)).await;
            }
        }
    }

    async fn on_connection_state_change(
        &mut self,
        handle: TransportHandle,
        status: GattStatus,
        state: LinkState,
    ) {
        match state {
            LinkState::Connected => {
                if !self.transition(SessionStatus::Connected) {
                    return;
                }

                info!(%handle, "Connected, starting service discovery");
                if let Err(e) = self.backend.discover_services(handle).await {
                    error!("Service discovery request failed: {}", e);
                    self.end_attempt(SessionError::Backend(e)).await;
                }
            }
            LinkState::Disconnected => self.on_link_lost(handle, status).await,
            LinkState::Connecting | LinkState::Disconnecting => {
                debug!(%handle, ?state, "Intermediate link state");
            }
        }
    }

    async fn on_link_lost(&mut self, handle: TransportHandle, status: GattStatus) {
        info!(%handle, %status, "Disconnected from GATT server");

        if let Some(session) = self.session.as_mut() {
            session.transport_handle = None;
        }
        self.close_transport(handle).await;

        if self.state.status() != SessionStatus::Connecting {
            self.end_attempt(SessionError::TerminalConnectFailure(status))
                .await;
            return;
        }

        let now = Instant::now();
        let decision = self
            .session
            .as_mut()
            .and_then(|s| s.connection.as_mut())
            .map(|c| (c.on_link_lost(status, now), c.peripheral().clone()));

        match decision {
            Some((LinkLossDecision::Retry, peripheral)) => self.issue_connect(peripheral).await,
            Some((LinkLossDecision::GiveUp(reason), _)) => self.end_attempt(reason).await,
            None => {
                self.end_attempt(SessionError::TerminalConnectFailure(status))
                    .await
            }
        }
    }

    // Discovery and notifications

    async fn on_services_discovered(
        &mut self,
        handle: TransportHandle,
        status: GattStatus,
        services: Vec<GattService>,
    ) {
        if self.state.status() != SessionStatus::Connected {
            return;
        }

        match listener::on_services_discovered(status, &services) {
            Ok(read) => {
                if let Err(e) = self.issue(handle, read).await {
                    error!("Control characteristic read request failed: {}", e);
                }
            }
            Err(e) => error!("{}", e),
        }
    }

    async fn on_characteristic_read(
        &mut self,
        handle: TransportHandle,
        characteristic: Uuid,
        status: GattStatus,
        value: Vec<u8>,
    ) {
        if self.state.status() != SessionStatus::Connected {
            return;
        }

        if let Some(enable) = listener::on_characteristic_read(characteristic, status, &value)
            && let Err(e) = self.issue(handle, enable).await
        {
            error!("Enabling notifications failed: {}", e);
        }
    }

    fn on_characteristic_changed(&self, characteristic: Uuid, value: &[u8]) {
        if !matches!(
            self.state.status(),
            SessionStatus::Connected | SessionStatus::Ready
        ) {
            return;
        }

        if let Some(text) = listener::decode_notification(characteristic, value) {
            debug!(value = %text, "Characteristic changed");
            self.sink.on_value_notified(&text);
        }
    }

    // Command channel

    async fn issue_lock_command(&mut self, command: LockCommand) -> CommandResult<()> {
        let handle = self.session.as_ref().and_then(|s| s.transport_handle);
        let (handle, write) = command::prepare(self.state.status(), handle, command)?;

        info!(%command, %handle, "Issuing command");
        self.issue(handle, write).await?;
        Ok(())
    }

    async fn issue(
        &self,
        handle: TransportHandle,
        command: CharacteristicCommand,
    ) -> BackendResult<()> {
        let characteristic = command.characteristic_id;

        match command.operation {
            CharacteristicOperation::Read => {
                self.backend
                    .read_characteristic(handle, LOCK_SERVICE_UUID, characteristic)
                    .await
            }
            CharacteristicOperation::Write(value) => {
                self.backend
                    .write_characteristic(handle, LOCK_SERVICE_UUID, characteristic, &value)
                    .await
            }
            CharacteristicOperation::EnableNotify => {
                self.backend
                    .write_descriptor(
                        handle,
                        LOCK_SERVICE_UUID,
                        characteristic,
                        CCCD_UUID,
                        &ENABLE_NOTIFICATION_VALUE,
                    )
                    .await
            }
        }
    }

    // Lifecycle

    async fn disconnect(&mut self) {
        info!("Disconnect requested");
        self.teardown().await;
        self.transition(SessionStatus::Disconnected);
    }

    /// End the attempt after a failure and tell the user
    async fn end_attempt(&mut self, reason: SessionError) {
        warn!("Connection failed: {}", reason);
        self.teardown().await;
        self.transition(SessionStatus::Disconnected);
        self.sink.on_connection_failed(&reason);
    }

    /// Cancel timers, stop the scan and close the transport
    ///
    /// Bumps the generation so nothing scheduled for the old attempt can
    /// touch the next one.
    async fn teardown(&mut self) {
        self.timers.cancel_all();
        self.generation += 1;

        let Some(session) = self.session.take() else {
            return;
        };

        if session.scan_in_progress
            && let Err(e) = self.backend.stop_scan().await
        {
            warn!("Failed to stop scan: {}", e);
        }

        if let Some(handle) = session.transport_handle {
            self.close_transport(handle).await;
        }
    }

    async fn close_transport(&self, handle: TransportHandle) {
        debug!(%handle, "Closing transport");
        if let Err(e) = self.backend.close(handle).await {
            warn!(%handle, "Failed to close transport: {}", e);
        }
    }

    fn is_current(&self, handle: TransportHandle) -> bool {
        let current = self
            .session
            .as_ref()
            .and_then(|s| s.transport_handle)
            .is_some_and(|h| h == handle);
        if !current {
            debug!(%handle, "Dropping event of stale transport");
        }
        current
    }

    fn transition(&mut self, to: SessionStatus) -> bool {
        match self.state.transition(to) {
            Some(status) => {
                self.sink.on_status_changed(status);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.as_ref();
        SessionSnapshot {
            status: self.state.status(),
            device_name: session.map(|s| s.target_device_name.clone()),
            peripheral: session.and_then(|s| s.peripheral.clone()),
            timed_out: session
                .and_then(|s| s.connection.as_ref())
                .is_some_and(|c| c.is_timed_out()),
        }
    }
}
