use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::storage::StorageBackend;
use crate::storage::error::StorageResult;
use crate::storage::schema::{AlertRow, AlertType, NewAlert, ServiceRow, ServiceStatus};

/// Turns alert-worthy transitions into alert records.
///
/// Deciding *whether* a transition is alert-worthy is the aggregator's job,
/// and so is persisting the record: it lands in the same storage write as
/// the status change it describes.
#[derive(Clone)]
pub struct AlertGenerator {
    store: Arc<dyn StorageBackend>,
}

impl AlertGenerator {
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self { store }
    }

    pub fn for_transition(
        &self,
        service: &ServiceRow,
        from: ServiceStatus,
        to: ServiceStatus,
        alert_type: AlertType,
    ) -> NewAlert {
        NewAlert {
            service_id: service.id,
            alert_type,
            message: Self::message_for(&service.name, from, to, alert_type),
            timestamp: Utc::now(),
        }
    }

    pub fn message_for(
        service_name: &str,
        from: ServiceStatus,
        to: ServiceStatus,
        alert_type: AlertType,
    ) -> String {
        match alert_type {
            AlertType::StatusChange => {
                format!("Service '{service_name}' became unreachable ({from} -> {to})")
            }
            AlertType::Degraded => {
                format!("Service '{service_name}' response degraded ({from} -> {to})")
            }
            AlertType::Recovery => format!("Service '{service_name}' recovered ({from} -> {to})"),
        }
    }

    /// Mark an alert as acknowledged. Acknowledging twice returns the same
    /// row; `None` means the alert doesn't exist.
    #[instrument(skip(self))]
    pub async fn acknowledge(&self, alert_id: i64) -> StorageResult<Option<AlertRow>> {
        let Some(existing) = self.store.get_alert(alert_id).await? else {
            return Ok(None);
        };

        if existing.acknowledged {
            debug!("alert #{alert_id} already acknowledged");
            return Ok(Some(existing));
        }

        self.store.acknowledge_alert(alert_id).await
    }
}
