//! Adapter Controller
//!
//! Guards the BLE platform: radio enablement, initialization order and the
//! at-most-one-scan rule.

use crate::domain::error::AdapterError;
use crate::domain::models::{PeripheralRecord, ScanOutcome, ScanRequest, StartOptions};
use crate::infrastructure::bluetooth::platform::{BlePlatform, PlatformEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

pub struct AdapterController {
    platform: Arc<dyn BlePlatform>,
    radio_enabled: AtomicBool,
    initialized: AtomicBool,
    scanning: AtomicBool,
}

impl AdapterController {
    pub fn new(platform: Arc<dyn BlePlatform>) -> Self {
        Self {
            platform,
            radio_enabled: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            scanning: AtomicBool::new(false),
        }
    }

    /// Enable the radio. No-op once it has succeeded.
    pub async fn enable_radio(&self) -> Result<(), AdapterError> {
        if self.radio_enabled.load(Ordering::Acquire) {
            return Ok(());
        }
        self.platform.enable_bluetooth().await.map_err(|e| {
            error!("Failed to enable Bluetooth: {}", e);
            e
        })?;
        self.radio_enabled.store(true, Ordering::Release);
        info!("Bluetooth is turned on");
        Ok(())
    }

    pub async fn initialize(&self, options: StartOptions) -> Result<(), AdapterError> {
        self.platform.start(options).await.map_err(|e| {
            error!("Failed to initialize BLE platform: {}", e);
            e
        })?;
        self.initialized.store(true, Ordering::Release);
        info!("BLE platform initialized (show_alert: {})", options.show_alert);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn ensure_initialized(&self) -> Result<(), AdapterError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(AdapterError::NotInitialized)
        }
    }

    /// Start a duration-bounded scan.
    ///
    /// A call made while a scan is running does not reach the platform.
    /// The scanning flag is only cleared by [`Self::on_scan_stopped`].
    pub async fn start_scan(&self, request: &ScanRequest) -> Result<ScanOutcome, AdapterError> {
        self.ensure_initialized()?;

        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Scan already in progress, ignoring request");
            return Ok(ScanOutcome::AlreadyScanning);
        }

        match self.platform.scan(request).await {
            Ok(()) => {
                info!(
                    "Scanning for {}s (filters: {:?}, duplicates: {})",
                    request.duration_secs, request.service_filters, request.allow_duplicates
                );
                Ok(ScanOutcome::Started)
            }
            Err(e) => {
                self.scanning.store(false, Ordering::Release);
                error!("Failed to start scan: {}", e);
                Err(e)
            }
        }
    }

    /// Stop a running scan early. The platform reports the stop as an event.
    pub async fn stop_scan(&self) -> Result<(), AdapterError> {
        self.ensure_initialized()?;
        if !self.is_scanning() {
            return Ok(());
        }
        self.platform.stop_scan().await
    }

    /// Called when the platform reports that scanning has ended.
    pub fn on_scan_stopped(&self) {
        self.scanning.store(false, Ordering::Release);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub async fn connect(&self, id: &str) -> Result<(), AdapterError> {
        self.ensure_initialized()?;
        info!("Connecting to {}", id);
        self.platform.connect(id).await.map_err(|e| {
            error!("Failed to connect to {}: {}", id, e);
            e
        })
    }

    pub async fn disconnect(&self, id: &str) -> Result<(), AdapterError> {
        self.ensure_initialized()?;
        info!("Disconnecting from {}", id);
        self.platform.disconnect(id).await.map_err(|e| {
            error!("Failed to disconnect from {}: {}", id, e);
            e
        })
    }

    pub async fn list_bonded(
        &self,
        service_filters: &[String],
    ) -> Result<Vec<PeripheralRecord>, AdapterError> {
        self.ensure_initialized()?;
        let bonded = self.platform.bonded_peripherals(service_filters).await?;
        info!("Found {} bonded peripheral(s)", bonded.len());
        Ok(bonded)
    }

    pub fn events(&self) -> broadcast::Receiver<PlatformEvent> {
        self.platform.subscribe()
    }
}
