//! Presentation Adapter
//!
//! Projects registry state into the two ordered lists the screen renders.

use crate::domain::models::{PeripheralRecord, SessionState, StatusMessage};
use crate::domain::registry::PeripheralRegistry;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRow {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub connected: bool,
}

impl DeviceRow {
    pub fn action(&self) -> RowAction {
        if self.connected {
            RowAction::Disconnect
        } else {
            RowAction::Connect
        }
    }

    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "Unknown device",
        }
    }
}

impl From<PeripheralRecord> for DeviceRow {
    fn from(record: PeripheralRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            rssi: record.rssi,
            connected: record.connected,
        }
    }
}

/// Immutable snapshot of everything the screen shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub discovered: Vec<DeviceRow>,
    pub connected: Vec<DeviceRow>,
    pub is_scanning: bool,
    /// Startup (permissions, radio, bonded listing) has finished
    pub started: bool,
    pub status: Option<StatusMessage>,
    /// Peripherals with a connect or disconnect still in flight
    pub pending: BTreeSet<String>,
}

impl SessionView {
    pub fn scan_label(&self) -> &'static str {
        if self.is_scanning {
            "Scanning..."
        } else {
            "Scan Bluetooth Devices"
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    #[cfg(test)]
    pub fn discovered_ids(&self) -> Vec<&str> {
        self.discovered.iter().map(|r| r.id.as_str()).collect()
    }

    #[cfg(test)]
    pub fn connected_ids(&self) -> Vec<&str> {
        self.connected.iter().map(|r| r.id.as_str()).collect()
    }
}

pub struct PresentationAdapter;

impl PresentationAdapter {
    pub fn project(
        registry: &PeripheralRegistry,
        state: SessionState,
        started: bool,
        status: Option<&StatusMessage>,
    ) -> SessionView {
        SessionView {
            discovered: registry
                .snapshot_discovered()
                .into_iter()
                .map(DeviceRow::from)
                .collect(),
            connected: registry
                .snapshot_connected()
                .into_iter()
                .map(DeviceRow::from)
                .collect(),
            is_scanning: state == SessionState::Scanning,
            started,
            status: status.cloned(),
            pending: BTreeSet::new(),
        }
    }
}
