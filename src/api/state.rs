//! Shared state for API handlers

use std::sync::Arc;

use crate::actors::aggregator::AggregatorHandle;
use crate::alerts::AlertGenerator;
use crate::registrar::HeartbeatRegistrar;
use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Read model for services, agents, alerts and history
    pub store: Arc<dyn StorageBackend>,

    /// Api key validation and heartbeat handling
    pub registrar: HeartbeatRegistrar,

    /// Single entry point for probe results
    pub aggregator: AggregatorHandle,

    /// Alert acknowledgement
    pub alerts: AlertGenerator,
}

impl ApiState {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        registrar: HeartbeatRegistrar,
        aggregator: AggregatorHandle,
        alerts: AlertGenerator,
    ) -> Self {
        Self {
            store,
            registrar,
            aggregator,
            alerts,
        }
    }
}
