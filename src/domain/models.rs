use std::collections::BTreeSet;

/// A remote BLE peripheral as last observed by the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeripheralRecord {
    /// Platform-stable identifier, unique key in the registry
    pub id: String,
    pub name: Option<String>,
    /// Advertised GATT service identifiers (short form for SIG UUIDs)
    pub service_uuids: BTreeSet<String>,
    pub rssi: Option<i16>,
    pub connected: bool,
    /// Seen by at least one discovery event
    pub discovered: bool,
    /// Scan generation in which the peripheral was last discovered
    pub last_scan: u64,
}

impl PeripheralRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[cfg(test)]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    #[cfg(test)]
    pub fn with_service(mut self, uuid: impl Into<String>) -> Self {
        self.service_uuids.insert(uuid.into());
        self
    }

    /// Name for display, falling back to the id.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.id,
        }
    }
}

/// How an upsert treats the `connected` flag of an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagUpdate {
    Preserve,
    Set(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Started,
    AlreadyScanning,
}

/// Options passed to the BLE platform when it is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartOptions {
    /// Let the platform surface its own prompts
    pub show_alert: bool,
}

/// Parameters of a single scan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub service_filters: Vec<String>,
    pub duration_secs: u64,
    pub allow_duplicates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    FineLocation,
    CoarseLocation,
    BluetoothConnect,
    BluetoothScan,
    BluetoothAdvertise,
}

impl Permission {
    /// Permissions requested as one batch at startup.
    pub const REQUESTED: [Permission; 5] = [
        Permission::FineLocation,
        Permission::CoarseLocation,
        Permission::BluetoothConnect,
        Permission::BluetoothScan,
        Permission::BluetoothAdvertise,
    ];

    /// Permissions that must all be granted for scanning to work.
    pub const REQUIRED: [Permission; 3] = [
        Permission::FineLocation,
        Permission::BluetoothConnect,
        Permission::BluetoothScan,
    ];

    pub fn platform_name(&self) -> &'static str {
        match self {
            Permission::FineLocation => "android.permission.ACCESS_FINE_LOCATION",
            Permission::CoarseLocation => "android.permission.ACCESS_COARSE_LOCATION",
            Permission::BluetoothConnect => "android.permission.BLUETOOTH_CONNECT",
            Permission::BluetoothScan => "android.permission.BLUETOOTH_SCAN",
            Permission::BluetoothAdvertise => "android.permission.BLUETOOTH_ADVERTISE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionResult {
    Granted,
    Denied {
        missing: BTreeSet<Permission>,
        diagnostic: Option<String>,
    },
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
