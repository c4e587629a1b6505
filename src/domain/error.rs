use crate::domain::models::Permission;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by the BLE platform layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("Bluetooth radio unavailable: {0}")]
    RadioUnavailable(String),
    #[error("Bluetooth adapter is not initialized")]
    NotInitialized,
    #[error("Bluetooth permission denied: {0}")]
    PermissionDenied(String),
    #[error("Peripheral {0} is unreachable")]
    PeripheralNotFound(String),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Platform(String),
}

impl From<btleplug::Error> for AdapterError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => AdapterError::PermissionDenied(err.to_string()),
            btleplug::Error::DeviceNotFound => AdapterError::PeripheralNotFound(err.to_string()),
            btleplug::Error::TimedOut(after) => AdapterError::Timeout(after),
            other => AdapterError::Platform(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Scan,
    Connect,
    Disconnect,
    ListBonded,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Scan => "scan",
            Operation::Connect => "connect",
            Operation::Disconnect => "disconnect",
            Operation::ListBonded => "list peripherals of",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the session to whoever issued an intent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Missing permissions: {missing:?}")]
    PermissionDenied { missing: BTreeSet<Permission> },
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(AdapterError),
    #[error("Failed to {operation} {}: {cause}", .peripheral_id.as_deref().unwrap_or("adapter"))]
    OperationFailed {
        operation: Operation,
        peripheral_id: Option<String>,
        cause: AdapterError,
    },
    #[error("Ignored event: {0}")]
    EventDeliveryIgnored(String),
    #[error("A request for {peripheral_id} is already in flight")]
    Busy { peripheral_id: String },
    #[error("Session has ended")]
    SessionClosed,
}

impl SessionError {
    pub fn operation_failed(
        operation: Operation,
        peripheral_id: Option<&str>,
        cause: AdapterError,
    ) -> Self {
        match cause {
            AdapterError::NotInitialized | AdapterError::RadioUnavailable(_) => {
                SessionError::AdapterUnavailable(cause)
            }
            cause => SessionError::OperationFailed {
                operation,
                peripheral_id: peripheral_id.map(str::to_string),
                cause,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_failed_message() {
        let err = SessionError::operation_failed(
            Operation::Disconnect,
            Some("A"),
            AdapterError::Timeout(Duration::from_secs(10)),
        );
        assert_eq!(err.to_string(), "Failed to disconnect A: Operation timed out after 10s");
    }

    #[test]
    fn test_uninitialized_adapter_maps_to_unavailable() {
        let err = SessionError::operation_failed(
            Operation::Scan,
            None,
            AdapterError::NotInitialized,
        );
        assert!(matches!(err, SessionError::AdapterUnavailable(_)));
    }

    #[test]
    fn test_bonded_listing_failure_message() {
        let err = SessionError::operation_failed(
            Operation::ListBonded,
            None,
            AdapterError::Platform("properties unavailable".into()),
        );
        assert_eq!(
            err.to_string(),
            "Failed to list peripherals of adapter: properties unavailable"
        );
    }
}
