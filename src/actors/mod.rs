//! Hub-side actors
//!
//! Each actor runs as an independent async task communicating via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   agent reports (API)        DirectMonitorActor
//!            │                        │ probes direct services,
//!            │ ProbeReport            │ marks silent agents' services unknown
//!            └───────────┬────────────┘
//!                        ▼
//!               AggregatorActor  ──► AlertGenerator ──► alerts table
//!                        │
//!                        ▼
//!             broadcast<TransitionEvent>
//!
//!   RetentionActor: prunes probe history daily
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: The aggregator publishes transitions on a broadcast channel
//! 3. **Request/Response**: oneshot channels carry results back to callers

pub mod aggregator;
pub mod direct_monitor;
pub mod messages;
pub mod retention;
