//! In-memory BLE platform used by tests.

use crate::domain::error::AdapterError;
use crate::domain::models::{PeripheralRecord, ScanRequest, StartOptions};
use crate::infrastructure::bluetooth::platform::{BlePlatform, PlatformEvent, EVENT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub enable: usize,
    pub start: usize,
    pub scan: usize,
    pub stop_scan: usize,
    pub connect: usize,
    pub disconnect: usize,
    pub bonded: usize,
}

#[derive(Default)]
struct Script {
    calls: CallCounts,
    bonded: Vec<PeripheralRecord>,
    enable_error: Option<AdapterError>,
    scan_error: Option<AdapterError>,
    bonded_error: Option<AdapterError>,
    connect_errors: HashMap<String, AdapterError>,
    disconnect_errors: HashMap<String, AdapterError>,
    last_scan: Option<ScanRequest>,
    connect_gate: Option<Arc<Notify>>,
}

pub struct FakePlatform {
    script: Mutex<Script>,
    events: broadcast::Sender<PlatformEvent>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            script: Mutex::new(Script::default()),
            events,
        }
    }

    pub fn with_bonded(self, bonded: Vec<PeripheralRecord>) -> Self {
        self.script.lock().unwrap().bonded = bonded;
        self
    }

    pub fn calls(&self) -> CallCounts {
        self.script.lock().unwrap().calls
    }

    pub fn last_scan(&self) -> Option<ScanRequest> {
        self.script.lock().unwrap().last_scan.clone()
    }

    pub fn fail_enable(&self, err: AdapterError) {
        self.script.lock().unwrap().enable_error = Some(err);
    }

    pub fn fail_scan(&self, err: AdapterError) {
        self.script.lock().unwrap().scan_error = Some(err);
    }

    pub fn fail_bonded(&self, err: AdapterError) {
        self.script.lock().unwrap().bonded_error = Some(err);
    }

    pub fn fail_connect(&self, id: &str, err: AdapterError) {
        self.script.lock().unwrap().connect_errors.insert(id.to_string(), err);
    }

    pub fn fail_disconnect(&self, id: &str, err: AdapterError) {
        self.script.lock().unwrap().disconnect_errors.insert(id.to_string(), err);
    }

    /// Make every following connect wait until the returned gate is notified.
    pub fn hold_connects(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script.lock().unwrap().connect_gate = Some(gate.clone());
        gate
    }

    /// Deliver an event to every subscriber.
    pub fn emit(&self, event: PlatformEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl BlePlatform for FakePlatform {
    async fn enable_bluetooth(&self) -> Result<(), AdapterError> {
        let mut script = self.script.lock().unwrap();
        script.calls.enable += 1;
        script.enable_error.clone().map_or(Ok(()), Err)
    }

    async fn start(&self, _options: StartOptions) -> Result<(), AdapterError> {
        self.script.lock().unwrap().calls.start += 1;
        Ok(())
    }

    async fn scan(&self, request: &ScanRequest) -> Result<(), AdapterError> {
        let mut script = self.script.lock().unwrap();
        script.calls.scan += 1;
        script.last_scan = Some(request.clone());
        script.scan_error.clone().map_or(Ok(()), Err)
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        self.script.lock().unwrap().calls.stop_scan += 1;
        self.emit(PlatformEvent::ScanStopped);
        Ok(())
    }

    async fn connect(&self, id: &str) -> Result<(), AdapterError> {
        let (gate, result) = {
            let mut script = self.script.lock().unwrap();
            script.calls.connect += 1;
            let result = script.connect_errors.get(id).cloned().map_or(Ok(()), Err);
            (script.connect_gate.clone(), result)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn disconnect(&self, id: &str) -> Result<(), AdapterError> {
        let mut script = self.script.lock().unwrap();
        script.calls.disconnect += 1;
        script.disconnect_errors.get(id).cloned().map_or(Ok(()), Err)
    }

    async fn bonded_peripherals(
        &self,
        _service_filters: &[String],
    ) -> Result<Vec<PeripheralRecord>, AdapterError> {
        let mut script = self.script.lock().unwrap();
        script.calls.bonded += 1;
        match script.bonded_error.clone() {
            Some(err) => Err(err),
            None => Ok(script.bonded.clone()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }
}
