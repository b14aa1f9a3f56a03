//! Persistence for agents, services, alerts and probe history
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` lets the hub run on SQLite or purely
//!   in memory (tests, `backend = none`)
//! - **Async**: all operations are async for use from Tokio actors and axum
//!   handlers
//! - **Single write path for status**: `apply_transition` and `write_status`
//!   are only called by the status aggregator, which serializes updates per
//!   service. `apply_transition` stores the status and its alert atomically
//!
//! ## Backends
//!
//! - **SQLite** (default): embedded database with WAL and sqlx migrations
//! - **In-Memory**: no persistence, data is lost on restart

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
