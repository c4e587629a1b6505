//! BLE Platform Boundary
//!
//! The external BLE library as seen by the rest of the application. The
//! production implementation is [`super::service::BtleplugPlatform`].

use crate::domain::error::AdapterError;
use crate::domain::models::{PeripheralRecord, ScanRequest, StartOptions};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the platform event fan-out channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Asynchronous notification raised by the BLE platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    Discovered(PeripheralRecord),
    Connected(PeripheralRecord),
    Disconnected(PeripheralRecord),
    ScanStopped,
}

#[async_trait]
pub trait BlePlatform: Send + Sync {
    /// Turn the radio on (or verify that it is available).
    async fn enable_bluetooth(&self) -> Result<(), AdapterError>;

    /// Initialize the platform; required before any other operation.
    async fn start(&self, options: StartOptions) -> Result<(), AdapterError>;

    /// Start a scan that the platform stops by itself after
    /// `request.duration_secs`, emitting [`PlatformEvent::ScanStopped`].
    async fn scan(&self, request: &ScanRequest) -> Result<(), AdapterError>;

    async fn stop_scan(&self) -> Result<(), AdapterError>;

    async fn connect(&self, id: &str) -> Result<(), AdapterError>;

    async fn disconnect(&self, id: &str) -> Result<(), AdapterError>;

    /// Peripherals already paired with this host.
    async fn bonded_peripherals(
        &self,
        service_filters: &[String],
    ) -> Result<Vec<PeripheralRecord>, AdapterError>;

    /// Subscribe to platform events.
    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent>;
}

/// Run `fut`, mapping an elapsed deadline to [`AdapterError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, AdapterError>
where
    F: std::future::Future<Output = Result<T, AdapterError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AdapterError::Timeout(limit))?
}
