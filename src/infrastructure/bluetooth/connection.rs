//! BLE Connection Module
//!
//! Connects, disconnects and enumerates already-connected peripherals.

use crate::domain::error::AdapterError;
use crate::domain::models::PeripheralRecord;
use crate::infrastructure::bluetooth::platform::with_timeout;
use crate::infrastructure::bluetooth::protocol;
use btleplug::api::{Central, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Build a record from whatever the platform currently knows about `peripheral`.
///
/// The `connected` flag is left false; callers decide what the event means.
pub async fn peripheral_record(peripheral: &Peripheral) -> Result<PeripheralRecord, AdapterError> {
    let mut record = PeripheralRecord::new(peripheral.id().to_string());
    if let Some(props) = peripheral.properties().await? {
        record.name = props.local_name;
        record.rssi = props.rssi;
        record.service_uuids = props.services.iter().map(protocol::short_form).collect();
    }
    Ok(record)
}

/// BLE Connection handler
pub struct BleConnection {
    adapter: Adapter,
    timeout: Duration,
}

impl BleConnection {
    pub fn new(adapter: Adapter, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }

    async fn find(&self, id: &str) -> Result<Peripheral, AdapterError> {
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.id().to_string() == id)
            .ok_or_else(|| AdapterError::PeripheralNotFound(id.to_string()))
    }

    pub async fn connect(&self, id: &str) -> Result<(), AdapterError> {
        let peripheral = self.find(id).await?;
        if peripheral.is_connected().await.unwrap_or(false) {
            debug!("{} is already connected", id);
            return Ok(());
        }
        with_timeout(self.timeout, async {
            peripheral.connect().await.map_err(AdapterError::from)
        })
        .await?;
        info!("Connected to the BLE device {}", id);
        Ok(())
    }

    pub async fn disconnect(&self, id: &str) -> Result<(), AdapterError> {
        let peripheral = self.find(id).await?;
        if !peripheral.is_connected().await.unwrap_or(true) {
            debug!("{} is already disconnected", id);
            return Ok(());
        }
        with_timeout(self.timeout, async {
            peripheral.disconnect().await.map_err(AdapterError::from)
        })
        .await?;
        info!("Disconnected from the BLE device {}", id);
        Ok(())
    }

    /// Peripherals the host already holds a connection to.
    ///
    /// btleplug has no bond list, so an OS-level connection stands in for
    /// "previously paired".
    pub async fn bonded(
        &self,
        service_filters: &[String],
    ) -> Result<Vec<PeripheralRecord>, AdapterError> {
        let wanted: HashSet<String> = service_filters
            .iter()
            .map(|f| protocol::normalize_service(f))
            .collect();

        let mut bonded = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            if !peripheral.is_connected().await.unwrap_or(false) {
                continue;
            }
            let mut record = match peripheral_record(&peripheral).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping connected peripheral {}: {}", peripheral.id(), e);
                    continue;
                }
            };
            if !wanted.is_empty() && !record.service_uuids.iter().any(|s| wanted.contains(s)) {
                continue;
            }
            record.connected = true;
            bonded.push(record);
        }
        Ok(bonded)
    }
}
