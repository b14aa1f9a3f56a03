//! Message types for actor communication
//!
//! 1. **Commands**: Request/response messages sent to one actor via mpsc
//! 2. **Events**: Broadcast notifications for any number of subscribers

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::probe::ProbeStatus;
use crate::storage::error::StorageResult;
use crate::storage::schema::{AlertRow, CheckSource, ServiceStatus};

/// A probe result addressed to one service
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub service_id: i64,
    pub status: ProbeStatus,
    pub response_time_ms: Option<u64>,
    /// Hub clock at the time the result arrived (or the direct probe finished)
    pub checked_at: DateTime<Utc>,
    pub source: CheckSource,
}

/// What the aggregator did with a report
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Status was written; `alert` is set when the transition was alert-worthy
    Applied {
        previous: ServiceStatus,
        current: ServiceStatus,
        alert: Option<AlertRow>,
    },
    /// Older than the stored `last_checked`, dropped
    Stale,
    UnknownService,
}

/// Published whenever a service's status actually changes
///
/// The broadcast channel may lag or drop events for slow subscribers; the
/// persisted alerts remain the source of truth.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub service_id: i64,
    pub service_name: String,
    pub from: ServiceStatus,
    pub to: ServiceStatus,
    pub alert: Option<AlertRow>,
    pub timestamp: DateTime<Utc>,
}

/// Commands that can be sent to the AggregatorActor
#[derive(Debug)]
pub enum AggregatorCommand {
    /// Run one probe result through the state machine
    Apply {
        report: ProbeReport,
        respond_to: oneshot::Sender<StorageResult<ApplyOutcome>>,
    },

    /// Move a service to `unknown` because its agent went silent.
    ///
    /// Skipped unless the service is still assigned to `agent_id` and that
    /// agent is still inactive. Responds `true` if the status changed.
    MarkUnknown {
        service_id: i64,
        agent_id: i64,
        liveness_multiplier: u32,
        respond_to: oneshot::Sender<StorageResult<bool>>,
    },

    /// Gracefully shut down the aggregator
    Shutdown,
}

/// Commands that can be sent to the DirectMonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Probe every direct service now, regardless of its interval.
    ///
    /// Responds with the number of services probed.
    CheckNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    /// Change how often the monitor wakes up to look for due services
    UpdateInterval { interval_secs: u64 },

    /// Gracefully shut down the monitor
    Shutdown,
}

/// Commands that can be sent to the RetentionActor
#[derive(Debug)]
pub enum RetentionCommand {
    /// Run cleanup now; responds with the number of deleted rows
    CleanupNow {
        respond_to: oneshot::Sender<StorageResult<usize>>,
    },

    Shutdown,
}
