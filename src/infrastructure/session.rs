//! Session Manager
//!
//! Single owner of the [`PeripheralRegistry`]. Intents from the UI, events
//! from the BLE platform and results of finished adapter calls all go through
//! one queue and are applied in arrival order. Adapter calls run as separate
//! tasks, so a slow connect never holds up discovery.

use crate::domain::error::{AdapterError, Operation, SessionError};
use crate::domain::models::{
    FlagUpdate, MessageSeverity, PeripheralRecord, PermissionResult, ScanOutcome, ScanRequest,
    SessionState, StartOptions, StatusMessage,
};
use crate::domain::registry::PeripheralRegistry;
use crate::domain::settings::{Settings, StaleDiscoveryPolicy};
use crate::domain::view::{PresentationAdapter, SessionView};
use crate::infrastructure::bluetooth::{protocol, AdapterController, PlatformEvent};
use crate::infrastructure::permissions::PermissionGate;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Something the user asked for.
#[derive(Debug)]
pub enum SessionIntent {
    StartScan { reply: Option<Reply<ScanOutcome>> },
    StopScan,
    Connect { id: String, reply: Option<Reply<()>> },
    Disconnect { id: String, reply: Option<Reply<()>> },
    Shutdown,
}

#[derive(Debug)]
enum Completion {
    Startup {
        permissions: PermissionResult,
        bonded: Result<Vec<PeripheralRecord>, SessionError>,
    },
    Scan {
        result: Result<ScanOutcome, AdapterError>,
        reply: Option<Reply<ScanOutcome>>,
    },
    StopScan(Result<(), AdapterError>),
    Connect {
        id: String,
        result: Result<(), AdapterError>,
        reply: Option<Reply<()>>,
    },
    Disconnect {
        id: String,
        result: Result<(), AdapterError>,
        reply: Option<Reply<()>>,
    },
}

#[derive(Debug)]
enum SessionInput {
    Intent(SessionIntent),
    Event(PlatformEvent),
    Completed(Completion),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub scan: ScanRequest,
    pub start_options: StartOptions,
    pub stale_discovery: StaleDiscoveryPolicy,
    pub target_device_name: String,
    pub target_service_uuid: String,
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            scan: settings.scan_request(),
            start_options: settings.start_options(),
            stale_discovery: settings.stale_discovery,
            target_device_name: settings.target_device_name.clone(),
            target_service_uuid: settings.target_service_uuid.clone(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Forwards platform events into the session queue for as long as it lives.
struct ListenerGuard {
    task: JoinHandle<()>,
}

impl ListenerGuard {
    fn attach(
        mut events: broadcast::Receiver<PlatformEvent>,
        inbox: mpsc::WeakUnboundedSender<SessionInput>,
    ) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inbox) = inbox.upgrade() else { break };
                        if inbox.send(SessionInput::Event(event)).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        let err = SessionError::EventDeliveryIgnored(format!(
                            "{} platform events lost",
                            skipped
                        ));
                        warn!("{}", err);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    inbox: mpsc::UnboundedSender<SessionInput>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    fn send(&self, intent: SessionIntent) -> bool {
        self.inbox.send(SessionInput::Intent(intent)).is_ok()
    }

    #[cfg(test)]
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionIntent,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        if !self.send(make(tx)) {
            return Err(SessionError::SessionClosed);
        }
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    #[cfg(test)]
    pub async fn start_scan(&self) -> Result<ScanOutcome, SessionError> {
        self.request(|reply| SessionIntent::StartScan { reply: Some(reply) })
            .await
    }

    #[cfg(test)]
    pub async fn connect(&self, id: &str) -> Result<(), SessionError> {
        let id = id.to_string();
        self.request(|reply| SessionIntent::Connect {
            id,
            reply: Some(reply),
        })
        .await
    }

    #[cfg(test)]
    pub async fn disconnect(&self, id: &str) -> Result<(), SessionError> {
        let id = id.to_string();
        self.request(|reply| SessionIntent::Disconnect {
            id,
            reply: Some(reply),
        })
        .await
    }

    // Used by the UI thread; outcomes show up in the view.

    pub fn request_scan(&self) {
        self.send(SessionIntent::StartScan { reply: None });
    }

    pub fn request_stop_scan(&self) {
        self.send(SessionIntent::StopScan);
    }

    pub fn request_connect(&self, id: &str) {
        self.send(SessionIntent::Connect {
            id: id.to_string(),
            reply: None,
        });
    }

    pub fn request_disconnect(&self, id: &str) {
        self.send(SessionIntent::Disconnect {
            id: id.to_string(),
            reply: None,
        });
    }

    pub fn shutdown(&self) {
        self.send(SessionIntent::Shutdown);
    }

    /// Latest published view.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    #[cfg(test)]
    /// Wait until the published view satisfies `condition`.
    pub async fn wait_until(
        &self,
        condition: impl FnMut(&SessionView) -> bool,
    ) -> Result<SessionView, SessionError> {
        let mut view = self.view.clone();
        let matched = view
            .wait_for(condition)
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        Ok(matched.clone())
    }
}

pub struct SessionManager {
    registry: PeripheralRegistry,
    controller: Arc<AdapterController>,
    gate: PermissionGate,
    config: SessionConfig,
    state: SessionState,
    started: bool,
    scan_pending: bool,
    in_flight: HashSet<String>,
    status: Option<StatusMessage>,
    inbox: mpsc::UnboundedReceiver<SessionInput>,
    outbox: mpsc::WeakUnboundedSender<SessionInput>,
    events: Option<broadcast::Receiver<PlatformEvent>>,
    view: watch::Sender<SessionView>,
}

impl SessionManager {
    /// Create a session and the handle used to drive it.
    ///
    /// Platform events are buffered from this point on; nothing is applied
    /// until [`Self::run`] is polled.
    pub fn new(
        controller: Arc<AdapterController>,
        gate: PermissionGate,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SessionView::default());
        let events = Some(controller.events());

        let manager = Self {
            registry: PeripheralRegistry::new(),
            controller,
            gate,
            config,
            state: SessionState::Idle,
            started: false,
            scan_pending: false,
            in_flight: HashSet::new(),
            status: None,
            inbox,
            outbox: inbox_tx.downgrade(),
            events,
            view: view_tx,
        };
        let handle = SessionHandle {
            inbox: inbox_tx,
            view: view_rx,
        };
        (manager, handle)
    }

    /// Apply inputs until shutdown or until every handle is gone.
    ///
    /// The event listener is released on return, so the registry is never
    /// touched after the session ends.
    pub async fn run(mut self) {
        let _listener = self
            .events
            .take()
            .map(|events| ListenerGuard::attach(events, self.outbox.clone()));

        info!("Session started");
        self.spawn_startup();

        while let Some(input) = self.inbox.recv().await {
            if matches!(input, SessionInput::Intent(SessionIntent::Shutdown)) {
                break;
            }
            self.apply(input);
        }

        let known = self.registry.snapshot_all();
        info!(
            "Session ended ({} peripheral(s) known, {} connected)",
            known.len(),
            known.iter().filter(|r| r.connected).count()
        );
    }

    fn apply(&mut self, input: SessionInput) {
        match input {
            SessionInput::Intent(intent) => self.on_intent(intent),
            SessionInput::Event(event) => self.on_event(event),
            SessionInput::Completed(completion) => self.on_completed(completion),
        }
    }

    fn spawn_completion<F>(&self, operation: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            let completion = operation.await;
            if let Some(inbox) = outbox.upgrade() {
                let _ = inbox.send(SessionInput::Completed(completion));
            }
        });
    }

    fn spawn_startup(&self) {
        let controller = self.controller.clone();
        let gate = self.gate.clone();
        let options = self.config.start_options;
        let filters = self.config.scan.service_filters.clone();

        self.spawn_completion(async move {
            let permissions = gate.request_required_permissions().await;
            let bonded = async {
                controller
                    .enable_radio()
                    .await
                    .map_err(SessionError::AdapterUnavailable)?;
                controller
                    .initialize(options)
                    .await
                    .map_err(SessionError::AdapterUnavailable)?;
                controller
                    .list_bonded(&filters)
                    .await
                    .map_err(|cause| {
                        SessionError::operation_failed(Operation::ListBonded, None, cause)
                    })
            }
            .await;
            Completion::Startup {
                permissions,
                bonded,
            }
        });
    }

    fn on_intent(&mut self, intent: SessionIntent) {
        match intent {
            SessionIntent::StartScan { reply } => {
                if self.state == SessionState::Scanning || self.scan_pending {
                    debug!("Scan already running");
                    respond(reply, Ok(ScanOutcome::AlreadyScanning));
                    return;
                }
                self.scan_pending = true;
                let generation = self.registry.begin_scan();
                debug!("Requesting scan #{}", generation);

                let controller = self.controller.clone();
                let request = self.config.scan.clone();
                self.spawn_completion(async move {
                    Completion::Scan {
                        result: controller.start_scan(&request).await,
                        reply,
                    }
                });
            }
            SessionIntent::StopScan => {
                if self.state != SessionState::Scanning {
                    return;
                }
                let controller = self.controller.clone();
                self.spawn_completion(async move {
                    Completion::StopScan(controller.stop_scan().await)
                });
            }
            SessionIntent::Connect { id, reply } => {
                if self.registry.is_connected(&id) {
                    debug!("{} is already connected", id);
                    respond(reply, Ok(()));
                    return;
                }
                if !self.in_flight.insert(id.clone()) {
                    respond(reply, Err(SessionError::Busy { peripheral_id: id }));
                    return;
                }
                self.publish();
                let controller = self.controller.clone();
                self.spawn_completion(async move {
                    let result = controller.connect(&id).await;
                    Completion::Connect { id, result, reply }
                });
            }
            SessionIntent::Disconnect { id, reply } => {
                if !self.registry.is_connected(&id) {
                    debug!("{} is not connected", id);
                    respond(reply, Ok(()));
                    return;
                }
                if !self.in_flight.insert(id.clone()) {
                    respond(reply, Err(SessionError::Busy { peripheral_id: id }));
                    return;
                }
                self.publish();
                let controller = self.controller.clone();
                self.spawn_completion(async move {
                    let result = controller.disconnect(&id).await;
                    Completion::Disconnect { id, result, reply }
                });
            }
            SessionIntent::Shutdown => {}
        }
    }

    fn on_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::Discovered(record) => {
                if !accept_record(&record) {
                    return;
                }
                self.registry.record_discovery(record);
            }
            PlatformEvent::Connected(record) => {
                if !accept_record(&record) {
                    return;
                }
                info!("Peripheral connected: {}", record.display_name());
                if protocol::is_target_device(
                    &record,
                    &self.config.target_device_name,
                    &self.config.target_service_uuid,
                ) {
                    info!("Connected to the desired device");
                    self.status = Some(StatusMessage::new(
                        format!("{} glucometer connected", record.display_name()),
                        MessageSeverity::Success,
                    ));
                }
                self.apply_connection_event(record, true);
            }
            PlatformEvent::Disconnected(record) => {
                if !accept_record(&record) {
                    return;
                }
                info!("Peripheral disconnected: {}", record.display_name());
                self.apply_connection_event(record, false);
            }
            PlatformEvent::ScanStopped => {
                self.controller.on_scan_stopped();
                self.state = SessionState::Idle;
                info!("scan stopped");
                if self.config.stale_discovery == StaleDiscoveryPolicy::PruneOnScanStop {
                    let generation = self.registry.scan_generation();
                    let removed = self.registry.prune_stale(generation, &self.in_flight);
                    if removed > 0 {
                        debug!(
                            "Pruned {} stale peripheral(s), {} left",
                            removed,
                            self.registry.len()
                        );
                    }
                }
            }
        }
        self.publish();
    }

    fn apply_connection_event(&mut self, record: PeripheralRecord, connected: bool) {
        if record.name.is_none() && record.service_uuids.is_empty() {
            self.registry.set_connected(&record.id, connected);
        } else {
            self.registry.upsert(record, FlagUpdate::Set(connected));
        }
    }

    fn on_completed(&mut self, completion: Completion) {
        match completion {
            Completion::Startup {
                permissions,
                bonded,
            } => {
                self.started = true;
                if let PermissionResult::Denied { missing, diagnostic } = &permissions {
                    let err = SessionError::PermissionDenied {
                        missing: missing.clone(),
                    };
                    warn!("{} ({})", err, diagnostic.as_deref().unwrap_or("denied by user"));
                    self.status = Some(StatusMessage::new(
                        "Location and/or Bluetooth permissions denied",
                        MessageSeverity::Warning,
                    ));
                }
                match bonded {
                    Ok(bonded) => {
                        for record in bonded {
                            self.registry.upsert(record, FlagUpdate::Set(true));
                        }
                    }
                    Err(e) => {
                        warn!("Bluetooth startup incomplete: {}", e);
                        self.status =
                            Some(StatusMessage::new(e.to_string(), MessageSeverity::Warning));
                    }
                }
                self.publish();
            }
            Completion::Scan { result, reply } => {
                self.scan_pending = false;
                let result = match result {
                    Ok(ScanOutcome::Started) => {
                        // The scan may already have ended while the reply was queued
                        if self.controller.is_scanning() {
                            self.state = SessionState::Scanning;
                        }
                        info!("Scanning...");
                        Ok(ScanOutcome::Started)
                    }
                    Ok(ScanOutcome::AlreadyScanning) => Ok(ScanOutcome::AlreadyScanning),
                    Err(cause) => Err(self.fail(Operation::Scan, None, cause)),
                };
                self.publish();
                respond(reply, result);
            }
            Completion::StopScan(result) => {
                if let Err(cause) = result {
                    let _ = self.fail(Operation::Scan, None, cause);
                    self.publish();
                }
            }
            Completion::Connect { id, result, reply } => {
                self.in_flight.remove(&id);
                let result = match result {
                    Ok(()) => {
                        self.registry.set_connected(&id, true);
                        info!("Connected to the BLE device successfully");
                        self.status = Some(StatusMessage::new(
                            format!("Connected to {}", self.describe(&id)),
                            MessageSeverity::Success,
                        ));
                        Ok(())
                    }
                    Err(cause) => Err(self.fail(Operation::Connect, Some(&id), cause)),
                };
                self.publish();
                respond(reply, result);
            }
            Completion::Disconnect { id, result, reply } => {
                self.in_flight.remove(&id);
                let result = match result {
                    Ok(()) => {
                        self.registry.set_connected(&id, false);
                        info!("Disconnected from the BLE device successfully");
                        self.status = Some(StatusMessage::new(
                            format!("Disconnected from {}", self.describe(&id)),
                            MessageSeverity::Info,
                        ));
                        Ok(())
                    }
                    Err(cause) => Err(self.fail(Operation::Disconnect, Some(&id), cause)),
                };
                self.publish();
                respond(reply, result);
            }
        }
    }

    /// Record a failed operation on screen and in the log.
    fn fail(
        &mut self,
        operation: Operation,
        id: Option<&str>,
        cause: AdapterError,
    ) -> SessionError {
        let err = SessionError::operation_failed(operation, id, cause);
        warn!("{}", err);
        self.status = Some(StatusMessage::new(err.to_string(), MessageSeverity::Error));
        err
    }

    fn describe(&self, id: &str) -> String {
        self.registry
            .get(id)
            .map(|r| r.display_name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    fn publish(&self) {
        let mut view = PresentationAdapter::project(
            &self.registry,
            self.state,
            self.started,
            self.status.as_ref(),
        );
        view.pending = self.in_flight.iter().cloned().collect();
        self.view.send_replace(view);
    }
}

fn accept_record(record: &PeripheralRecord) -> bool {
    if record.id.trim().is_empty() {
        let err = SessionError::EventDeliveryIgnored("peripheral event without an id".to_string());
        warn!("{}", err);
        return false;
    }
    true
}

fn respond<T>(reply: Option<Reply<T>>, result: Result<T, SessionError>) {
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Permission;
    use crate::infrastructure::bluetooth::fake::FakePlatform;
    use crate::infrastructure::bluetooth::platform::EVENT_CHANNEL_CAPACITY;
    use crate::infrastructure::permissions::fake::FakePermissions;
    use crate::infrastructure::permissions::DesktopPermissions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        platform: Arc<FakePlatform>,
        handle: SessionHandle,
        task: JoinHandle<()>,
        markers: AtomicUsize,
    }

    impl Harness {
        async fn start(platform: FakePlatform) -> Self {
            let gate = PermissionGate::new(Arc::new(DesktopPermissions));
            Self::start_with(platform, SessionConfig::default(), gate).await
        }

        async fn start_with(
            platform: FakePlatform,
            config: SessionConfig,
            gate: PermissionGate,
        ) -> Self {
            let platform = Arc::new(platform);
            let controller = Arc::new(AdapterController::new(platform.clone()));
            let (manager, handle) = SessionManager::new(controller, gate, config);
            let task = tokio::spawn(manager.run());
            let harness = Self {
                platform,
                handle,
                task,
                markers: AtomicUsize::new(0),
            };
            harness.wait(|v| v.started).await;
            harness
        }

        async fn wait(&self, condition: impl FnMut(&SessionView) -> bool) -> SessionView {
            tokio::time::timeout(WAIT, self.handle.wait_until(condition))
                .await
                .expect("timed out waiting for view")
                .expect("session closed")
        }

        /// Emit `event` and wait until the session has processed it.
        async fn emit(&self, event: PlatformEvent) -> SessionView {
            self.platform.emit(event);
            let n = self.markers.fetch_add(1, Ordering::SeqCst);
            let marker = PeripheralRecord::new(format!("marker-{}", n));
            let marker_id = marker.id.clone();
            self.platform.emit(PlatformEvent::Discovered(marker));
            self.wait(|v| v.discovered.iter().any(|r| r.id == marker_id)).await
        }
    }

    fn samico() -> PeripheralRecord {
        PeripheralRecord::new("A").with_name("Samico GL").with_service("FFF0")
    }

    #[tokio::test]
    async fn test_glucometer_scenario() {
        let h = Harness::start(FakePlatform::new().with_bonded(vec![samico()])).await;

        let view = h.handle.view();
        assert_eq!(view.connected_ids(), vec!["A"]);
        assert!(view.discovered.is_empty());

        h.platform
            .emit(PlatformEvent::Discovered(PeripheralRecord::new("B").with_name("Other")));
        let view = h.wait(|v| !v.discovered.is_empty()).await;
        assert_eq!(view.discovered_ids(), vec!["B"]);
        assert_eq!(view.connected_ids(), vec!["A"]);

        h.handle.connect("B").await.unwrap();
        let view = h.handle.view();
        assert_eq!(view.connected_ids(), vec!["A", "B"]);
        assert!(view.discovered_ids().contains(&"B"));

        h.platform
            .fail_disconnect("A", AdapterError::Timeout(Duration::from_secs(10)));
        let err = h.handle.disconnect("A").await.unwrap_err();
        assert_eq!(
            err,
            SessionError::OperationFailed {
                operation: Operation::Disconnect,
                peripheral_id: Some("A".to_string()),
                cause: AdapterError::Timeout(Duration::from_secs(10)),
            }
        );
        let view = h.handle.view();
        assert_eq!(view.connected_ids(), vec!["A", "B"]);
        assert_eq!(view.status.unwrap().severity, MessageSeverity::Error);
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_is_idempotent() {
        let h = Harness::start(FakePlatform::new()).await;
        h.platform
            .emit(PlatformEvent::Discovered(PeripheralRecord::new("X")));
        h.wait(|v| !v.discovered.is_empty()).await;

        h.handle.connect("X").await.unwrap();
        h.handle.connect("X").await.unwrap();
        assert_eq!(h.platform.calls().connect, 1);
        assert_eq!(h.handle.view().connected_ids(), vec!["X"]);

        h.handle.disconnect("X").await.unwrap();
        h.handle.disconnect("X").await.unwrap();
        assert_eq!(h.platform.calls().disconnect, 1);
        let view = h.handle.view();
        assert!(view.connected.is_empty());
        assert!(!view.discovered[0].connected);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_registry_unchanged() {
        let h = Harness::start(FakePlatform::new()).await;
        h.platform
            .emit(PlatformEvent::Discovered(PeripheralRecord::new("B")));
        let before = h.wait(|v| !v.discovered.is_empty()).await;

        h.platform
            .fail_connect("B", AdapterError::PeripheralNotFound("B".into()));
        let err = h.handle.connect("B").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::OperationFailed {
                operation: Operation::Connect,
                ..
            }
        ));
        let after = h.handle.view();
        assert_eq!(after.discovered, before.discovered);
        assert!(after.connected.is_empty());
    }

    #[tokio::test]
    async fn test_discovery_never_downgrades_connected() {
        let h = Harness::start(FakePlatform::new().with_bonded(vec![samico()])).await;

        let view = h
            .emit(PlatformEvent::Discovered(
                PeripheralRecord::new("A").with_name("Samico GL").with_rssi(-55),
            ))
            .await;
        assert_eq!(view.connected_ids(), vec!["A"]);
        let a = view.discovered.iter().find(|r| r.id == "A").unwrap();
        assert!(a.connected);
        assert_eq!(a.rssi, Some(-55));
    }

    #[tokio::test]
    async fn test_repeated_discovery_keeps_one_row() {
        let h = Harness::start(FakePlatform::new()).await;
        h.platform.emit(PlatformEvent::Discovered(
            PeripheralRecord::new("B").with_name("Old").with_rssi(-90),
        ));
        let view = h
            .emit(PlatformEvent::Discovered(
                PeripheralRecord::new("B").with_name("New").with_rssi(-40),
            ))
            .await;

        let rows: Vec<_> = view.discovered.iter().filter(|r| r.id == "B").collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name.as_deref(), Some("New"));
        assert_eq!(rows[0].rssi, Some(-40));
    }

    #[tokio::test]
    async fn test_second_scan_issues_no_adapter_call() {
        let h = Harness::start(FakePlatform::new()).await;

        assert_eq!(h.handle.start_scan().await, Ok(ScanOutcome::Started));
        assert!(h.handle.view().is_scanning);
        assert_eq!(h.handle.start_scan().await, Ok(ScanOutcome::AlreadyScanning));
        assert_eq!(h.platform.calls().scan, 1);

        let request = h.platform.last_scan().unwrap();
        assert_eq!(request.duration_secs, 15);
        assert!(request.allow_duplicates);
    }

    #[tokio::test]
    async fn test_scan_stopped_always_goes_idle() {
        let h = Harness::start(FakePlatform::new()).await;

        h.platform.emit(PlatformEvent::ScanStopped);
        let view = h.emit(PlatformEvent::ScanStopped).await;
        assert!(!view.is_scanning);

        h.handle.start_scan().await.unwrap();
        h.platform.emit(PlatformEvent::ScanStopped);
        h.wait(|v| !v.is_scanning).await;

        assert_eq!(h.handle.start_scan().await, Ok(ScanOutcome::Started));
        assert_eq!(h.platform.calls().scan, 2);
    }

    #[tokio::test]
    async fn test_stop_scan_intent() {
        let h = Harness::start(FakePlatform::new()).await;
        h.handle.start_scan().await.unwrap();

        h.handle.request_stop_scan();
        h.wait(|v| !v.is_scanning).await;
        assert_eq!(h.platform.calls().stop_scan, 1);
    }

    #[tokio::test]
    async fn test_scan_failure_is_reported() {
        let h = Harness::start(FakePlatform::new()).await;
        h.platform
            .fail_scan(AdapterError::PermissionDenied("scan".into()));

        let err = h.handle.start_scan().await.unwrap_err();
        assert!(matches!(err, SessionError::OperationFailed { operation: Operation::Scan, .. }));
        let view = h.handle.view();
        assert!(!view.is_scanning);
        assert_eq!(view.scan_label(), "Scan Bluetooth Devices");
    }

    #[tokio::test]
    async fn test_discovery_continues_during_connect() {
        let h = Harness::start(FakePlatform::new()).await;
        h.platform
            .emit(PlatformEvent::Discovered(PeripheralRecord::new("B")));
        h.wait(|v| !v.discovered.is_empty()).await;

        let gate = h.platform.hold_connects();
        h.handle.request_connect("B");
        assert_eq!(
            h.handle.connect("B").await,
            Err(SessionError::Busy {
                peripheral_id: "B".to_string()
            })
        );

        h.platform
            .emit(PlatformEvent::Discovered(PeripheralRecord::new("C")));
        let view = h.wait(|v| v.discovered.len() == 2).await;
        assert!(view.connected.is_empty());
        assert!(view.is_pending("B"));

        gate.notify_one();
        let view = h.wait(|v| !v.connected.is_empty()).await;
        assert_eq!(view.connected_ids(), vec!["B"]);
        assert!(!view.is_pending("B"));
        assert_eq!(h.platform.calls().connect, 1);
    }

    #[tokio::test]
    async fn test_platform_connection_events() {
        let h = Harness::start(FakePlatform::new()).await;

        h.platform.emit(PlatformEvent::Connected(samico()));
        let view = h.wait(|v| !v.connected.is_empty()).await;
        assert_eq!(view.connected_ids(), vec!["A"]);
        assert!(view.status.unwrap().message.contains("Samico GL"));

        h.platform
            .emit(PlatformEvent::Disconnected(PeripheralRecord::new("A")));
        let view = h.wait(|v| v.connected.is_empty()).await;
        assert!(view.discovered.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_event_is_dropped() {
        let h = Harness::start(FakePlatform::new()).await;
        let view = h
            .emit(PlatformEvent::Discovered(PeripheralRecord::new("  ")))
            .await;
        assert_eq!(view.discovered.len(), 1);
    }

    #[tokio::test]
    async fn test_prune_on_scan_stop() {
        let config = SessionConfig {
            stale_discovery: StaleDiscoveryPolicy::PruneOnScanStop,
            ..SessionConfig::default()
        };
        let h = Harness::start_with(
            FakePlatform::new(),
            config,
            PermissionGate::new(Arc::new(DesktopPermissions)),
        )
        .await;

        h.handle.start_scan().await.unwrap();
        h.platform
            .emit(PlatformEvent::Discovered(PeripheralRecord::new("B")));
        h.wait(|v| v.discovered_ids() == vec!["B"]).await;
        h.platform.emit(PlatformEvent::ScanStopped);
        let view = h.wait(|v| !v.is_scanning).await;
        assert_eq!(view.discovered_ids(), vec!["B"]);

        h.handle.start_scan().await.unwrap();
        h.platform.emit(PlatformEvent::ScanStopped);
        let view = h.wait(|v| !v.is_scanning).await;
        assert!(view.discovered.is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_peripheral_with_pending_connect() {
        let config = SessionConfig {
            stale_discovery: StaleDiscoveryPolicy::PruneOnScanStop,
            ..SessionConfig::default()
        };
        let gate = PermissionGate::new(Arc::new(DesktopPermissions));
        let h = Harness::start_with(FakePlatform::new(), config, gate).await;

        h.handle.start_scan().await.unwrap();
        h.platform.emit(PlatformEvent::Discovered(
            PeripheralRecord::new("B").with_name("Samico GL"),
        ));
        h.wait(|v| v.discovered_ids() == vec!["B"]).await;
        h.platform.emit(PlatformEvent::ScanStopped);
        h.wait(|v| !v.is_scanning).await;

        h.handle.start_scan().await.unwrap();
        let connects = h.platform.hold_connects();
        h.handle.request_connect("B");
        h.wait(|v| v.is_pending("B")).await;

        h.platform.emit(PlatformEvent::ScanStopped);
        let view = h.wait(|v| !v.is_scanning).await;
        assert_eq!(view.discovered_ids(), vec!["B"]);

        connects.notify_one();
        let view = h.wait(|v| !v.connected.is_empty()).await;
        assert_eq!(view.connected[0].display_name(), "Samico GL");
        assert_eq!(view.connected_ids(), vec!["B"]);
        assert_eq!(view.discovered_ids(), vec!["B"]);
        assert_eq!(view.status.unwrap().message, "Connected to Samico GL");
    }

    #[tokio::test]
    async fn test_bonded_listing_failure_keeps_adapter_usable() {
        let platform = FakePlatform::new();
        platform.fail_bonded(AdapterError::Platform("properties unavailable".into()));
        let h = Harness::start(platform).await;

        let status = h.handle.view().status.unwrap();
        assert_eq!(status.severity, MessageSeverity::Warning);
        assert!(status.message.starts_with("Failed to list peripherals of adapter"));

        assert_eq!(h.handle.start_scan().await, Ok(ScanOutcome::Started));
        assert_eq!(h.platform.calls().scan, 1);
    }

    #[tokio::test]
    async fn test_lagged_event_stream_is_survived() {
        let h = Harness::start(FakePlatform::new()).await;

        let flood = EVENT_CHANNEL_CAPACITY + 50;
        for i in 0..flood {
            h.platform.emit(PlatformEvent::Discovered(PeripheralRecord::new(format!(
                "flood-{}",
                i
            ))));
        }
        let view = h
            .emit(PlatformEvent::Discovered(PeripheralRecord::new("after")))
            .await;

        assert!(view.discovered.len() < flood);
        assert!(view.discovered_ids().contains(&"after"));
        assert!(!view.discovered_ids().contains(&"flood-0"));

        h.handle.connect("after").await.unwrap();
        assert!(h.handle.view().connected_ids().contains(&"after"));
    }

    #[tokio::test]
    async fn test_startup_failure_degrades() {
        let platform = FakePlatform::new().with_bonded(vec![samico()]);
        platform.fail_enable(AdapterError::RadioUnavailable("radio off".into()));
        let h = Harness::start(platform).await;

        let view = h.handle.view();
        assert!(view.connected.is_empty());
        assert_eq!(view.status.unwrap().severity, MessageSeverity::Warning);
        assert_eq!(h.platform.calls().bonded, 0);

        let err = h.handle.start_scan().await.unwrap_err();
        assert_eq!(err, SessionError::AdapterUnavailable(AdapterError::NotInitialized));
        assert_eq!(h.platform.calls().scan, 0);
    }

    #[tokio::test]
    async fn test_permission_denial_does_not_block_startup() {
        let gate = PermissionGate::new(Arc::new(FakePermissions {
            denied: vec![Permission::BluetoothConnect],
            fail: false,
        }));
        let h = Harness::start_with(
            FakePlatform::new().with_bonded(vec![samico()]),
            SessionConfig::default(),
            gate,
        )
        .await;

        let view = h.handle.view();
        assert_eq!(view.connected_ids(), vec!["A"]);
        assert!(view.status.unwrap().message.contains("permissions denied"));
    }

    #[tokio::test]
    async fn test_shutdown_releases_listener() {
        let h = Harness::start(FakePlatform::new()).await;
        assert_eq!(h.platform.subscriber_count(), 1);

        h.handle.shutdown();
        tokio::time::timeout(WAIT, h.task).await.unwrap().unwrap();

        tokio::time::timeout(WAIT, async {
            while h.platform.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(h.handle.connect("B").await, Err(SessionError::SessionClosed));
    }
}
