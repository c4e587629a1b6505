//! BLE Scanner Module
//!
//! Duration-bounded discovery on top of the btleplug adapter event stream.

use crate::domain::error::AdapterError;
use crate::domain::models::{PeripheralRecord, ScanRequest};
use crate::infrastructure::bluetooth::connection::peripheral_record;
use crate::infrastructure::bluetooth::platform::PlatformEvent;
use crate::infrastructure::bluetooth::protocol;
use btleplug::api::{Central, CentralEvent, ScanFilter};
use btleplug::platform::{Adapter, PeripheralId};
use futures::stream::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which advertisements of the running scan get forwarded
#[derive(Default)]
struct ScanTracker {
    active: AtomicBool,
    allow_duplicates: AtomicBool,
    seen: Mutex<HashSet<PeripheralId>>,
}

impl ScanTracker {
    fn reset(&self, allow_duplicates: bool) {
        self.allow_duplicates.store(allow_duplicates, Ordering::Release);
        if let Ok(mut seen) = self.seen.lock() {
            seen.clear();
        }
    }

    fn accept(&self, id: &PeripheralId) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        if self.allow_duplicates.load(Ordering::Acquire) {
            return true;
        }
        self.seen
            .lock()
            .map(|mut seen| seen.insert(id.clone()))
            .unwrap_or(true)
    }
}

/// BLE Scanner forwarding adapter events as [`PlatformEvent`]s
pub struct BleScanner {
    adapter: Adapter,
    events: broadcast::Sender<PlatformEvent>,
    tracker: Arc<ScanTracker>,
    pump: JoinHandle<()>,
    stop_timer: Mutex<Option<JoinHandle<()>>>,
}

impl BleScanner {
    /// Subscribe to the adapter and start forwarding its events.
    pub async fn start(
        adapter: Adapter,
        events: broadcast::Sender<PlatformEvent>,
    ) -> Result<Self, AdapterError> {
        let stream = adapter.events().await?;
        let tracker = Arc::new(ScanTracker::default());

        let pump = {
            let adapter = adapter.clone();
            let events = events.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                let mut stream = stream;
                while let Some(event) = stream.next().await {
                    forward_event(&adapter, &events, &tracker, event).await;
                }
                debug!("Adapter event stream ended");
            })
        };

        Ok(Self {
            adapter,
            events,
            tracker,
            pump,
            stop_timer: Mutex::new(None),
        })
    }

    /// Start scanning; a timer stops the scan after `request.duration_secs`.
    pub async fn scan(&self, request: &ScanRequest) -> Result<(), AdapterError> {
        let services = protocol::parse_service_filters(&request.service_filters);
        self.tracker.reset(request.allow_duplicates);

        self.adapter.start_scan(ScanFilter { services }).await?;
        self.tracker.active.store(true, Ordering::Release);
        info!("BLE scan started for {}s", request.duration_secs);

        let duration = Duration::from_secs(request.duration_secs);
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let tracker = self.tracker.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            finish_scan(&adapter, &events, &tracker).await;
        });

        let previous = self
            .stop_timer
            .lock()
            .map_err(|_| AdapterError::Platform("Lock error".to_string()))?
            .replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    /// Stop scanning before the timer fires
    pub async fn stop(&self) -> Result<(), AdapterError> {
        if let Ok(mut timer) = self.stop_timer.lock() {
            if let Some(timer) = timer.take() {
                timer.abort();
            }
        }
        finish_scan(&self.adapter, &self.events, &self.tracker).await;
        Ok(())
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        self.pump.abort();
        if let Ok(mut timer) = self.stop_timer.lock() {
            if let Some(timer) = timer.take() {
                timer.abort();
            }
        }
    }
}

async fn finish_scan(
    adapter: &Adapter,
    events: &broadcast::Sender<PlatformEvent>,
    tracker: &ScanTracker,
) {
    if !tracker.active.swap(false, Ordering::AcqRel) {
        return;
    }
    if let Err(e) = adapter.stop_scan().await {
        warn!("Failed to stop BLE scan: {}", e);
    }
    info!("Scan stopped");
    let _ = events.send(PlatformEvent::ScanStopped);
}

type EventKind = fn(PeripheralRecord) -> PlatformEvent;

async fn forward_event(
    adapter: &Adapter,
    events: &broadcast::Sender<PlatformEvent>,
    tracker: &ScanTracker,
    event: CentralEvent,
) {
    let (id, is_discovery, kind): (PeripheralId, bool, EventKind) = match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
            if !tracker.accept(&id) {
                return;
            }
            (id, true, PlatformEvent::Discovered)
        }
        CentralEvent::DeviceConnected(id) => (id, false, PlatformEvent::Connected),
        CentralEvent::DeviceDisconnected(id) => (id, false, PlatformEvent::Disconnected),
        _ => return,
    };

    let record = match adapter.peripheral(&id).await {
        Ok(peripheral) => peripheral_record(&peripheral).await,
        Err(e) => Err(e.into()),
    };

    let event = match record {
        Ok(record) => kind(record),
        Err(e) if is_discovery => {
            warn!("Dropping discovery of {}: {}", id, e);
            return;
        }
        // Connection changes still matter without advertisement details
        Err(e) => {
            debug!("No details for {}: {}", id, e);
            kind(PeripheralRecord::new(id.to_string()))
        }
    };
    let _ = events.send(event);
}
