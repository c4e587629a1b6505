//! Permission Gate
//!
//! One-shot request of the OS permissions BLE scanning needs.

use crate::domain::models::{Permission, PermissionResult, PermissionStatus};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Host permission subsystem.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Whether this platform grants permissions at runtime.
    fn requires_runtime_grants(&self) -> bool;

    /// Request `permissions` as a single batch.
    async fn request(
        &self,
        permissions: &[Permission],
    ) -> anyhow::Result<HashMap<Permission, PermissionStatus>>;
}

/// Desktop hosts grant Bluetooth access outside the application.
pub struct DesktopPermissions;

#[async_trait]
impl PermissionProvider for DesktopPermissions {
    fn requires_runtime_grants(&self) -> bool {
        false
    }

    async fn request(
        &self,
        permissions: &[Permission],
    ) -> anyhow::Result<HashMap<Permission, PermissionStatus>> {
        Ok(permissions
            .iter()
            .map(|&p| (p, PermissionStatus::Granted))
            .collect())
    }
}

#[derive(Clone)]
pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        Self { provider }
    }

    pub async fn request_required_permissions(&self) -> PermissionResult {
        if !self.provider.requires_runtime_grants() {
            return PermissionResult::Granted;
        }

        let statuses = match self.provider.request(&Permission::REQUESTED).await {
            Ok(statuses) => statuses,
            Err(e) => {
                error!("Error requesting permissions: {:#}", e);
                return PermissionResult::Denied {
                    missing: BTreeSet::new(),
                    diagnostic: Some(e.to_string()),
                };
            }
        };

        let missing: BTreeSet<Permission> = Permission::REQUIRED
            .iter()
            .copied()
            .filter(|p| statuses.get(p) != Some(&PermissionStatus::Granted))
            .collect();

        if missing.is_empty() {
            info!("Location and Bluetooth permissions granted");
            PermissionResult::Granted
        } else {
            let names: Vec<&str> = missing.iter().map(Permission::platform_name).collect();
            warn!("Location and/or Bluetooth permissions denied: {}", names.join(", "));
            PermissionResult::Denied {
                missing,
                diagnostic: None,
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakePermissions;
    use super::*;

    fn gate(denied: Vec<Permission>, fail: bool) -> PermissionGate {
        PermissionGate::new(Arc::new(FakePermissions { denied, fail }))
    }

    #[tokio::test]
    async fn test_all_granted() {
        assert_eq!(
            gate(vec![], false).request_required_permissions().await,
            PermissionResult::Granted
        );
    }

    #[tokio::test]
    async fn test_optional_permissions_may_be_denied() {
        let result = gate(
            vec![Permission::CoarseLocation, Permission::BluetoothAdvertise],
            false,
        )
        .request_required_permissions()
        .await;
        assert_eq!(result, PermissionResult::Granted);
    }

    #[tokio::test]
    async fn test_missing_required_permission() {
        let result = gate(vec![Permission::BluetoothScan], false)
            .request_required_permissions()
            .await;
        match result {
            PermissionResult::Denied { missing, diagnostic } => {
                assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec![Permission::BluetoothScan]);
                assert!(diagnostic.is_none());
            }
            PermissionResult::Granted => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn test_provider_failure_is_denied_with_diagnostic() {
        let result = gate(vec![], true).request_required_permissions().await;
        match result {
            PermissionResult::Denied { missing, diagnostic } => {
                assert!(missing.is_empty());
                assert_eq!(diagnostic.as_deref(), Some("permission service unavailable"));
            }
            PermissionResult::Granted => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn test_desktop_skips_request() {
        let gate = PermissionGate::new(Arc::new(DesktopPermissions));
        assert_eq!(
            gate.request_required_permissions().await,
            PermissionResult::Granted
        );
    }
}
