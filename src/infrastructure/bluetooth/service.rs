//! Bluetooth Service Module
//!
//! [`BlePlatform`] implementation that coordinates the btleplug adapter,
//! scanning and connections.

use crate::domain::error::AdapterError;
use crate::domain::models::{PeripheralRecord, ScanRequest, StartOptions};
use crate::infrastructure::bluetooth::{
    connection::BleConnection,
    platform::{BlePlatform, PlatformEvent, EVENT_CHANNEL_CAPACITY},
    scanner::BleScanner,
};
use async_trait::async_trait;
use btleplug::api::{Central, Manager as _};
use btleplug::platform::{Adapter, Manager};
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};
use tracing::{info, warn};

pub struct BtleplugPlatform {
    adapter: OnceCell<Adapter>,
    scanner: OnceCell<BleScanner>,
    connect_timeout: Duration,
    events: broadcast::Sender<PlatformEvent>,
}

impl BtleplugPlatform {
    pub fn new(connect_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            adapter: OnceCell::new(),
            scanner: OnceCell::new(),
            connect_timeout,
            events,
        }
    }

    fn adapter(&self) -> Result<&Adapter, AdapterError> {
        self.adapter
            .get()
            .ok_or_else(|| AdapterError::RadioUnavailable("Bluetooth has not been enabled".to_string()))
    }

    fn scanner(&self) -> Result<&BleScanner, AdapterError> {
        self.scanner.get().ok_or(AdapterError::NotInitialized)
    }

    fn connection(&self) -> Result<BleConnection, AdapterError> {
        Ok(BleConnection::new(self.adapter()?.clone(), self.connect_timeout))
    }
}

#[async_trait]
impl BlePlatform for BtleplugPlatform {
    async fn enable_bluetooth(&self) -> Result<(), AdapterError> {
        let adapter = self
            .adapter
            .get_or_try_init(|| async {
                let manager = Manager::new().await?;
                manager
                    .adapters()
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| AdapterError::RadioUnavailable("No Bluetooth adapter found".to_string()))
            })
            .await?;

        match adapter.adapter_info().await {
            Ok(info) => info!("Using Bluetooth adapter: {}", info),
            Err(e) => warn!("Could not read adapter info: {}", e),
        }
        Ok(())
    }

    async fn start(&self, options: StartOptions) -> Result<(), AdapterError> {
        let adapter = self.adapter()?.clone();
        if options.show_alert {
            info!("Platform alerts are not available on this host");
        }
        self.scanner
            .get_or_try_init(|| BleScanner::start(adapter, self.events.clone()))
            .await?;
        Ok(())
    }

    async fn scan(&self, request: &ScanRequest) -> Result<(), AdapterError> {
        self.scanner()?.scan(request).await
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        self.scanner()?.stop().await
    }

    async fn connect(&self, id: &str) -> Result<(), AdapterError> {
        self.connection()?.connect(id).await
    }

    async fn disconnect(&self, id: &str) -> Result<(), AdapterError> {
        self.connection()?.disconnect(id).await
    }

    async fn bonded_peripherals(
        &self,
        service_filters: &[String],
    ) -> Result<Vec<PeripheralRecord>, AdapterError> {
        self.connection()?.bonded(service_filters).await
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }
}
