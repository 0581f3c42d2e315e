//! Core domain logic for FocusFlow.
//! Local-first task, note and project collections reconciled against a
//! remote record store.

pub mod config;
pub mod db;
pub mod engine;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod notify;
pub mod session;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use engine::{
    ConcurrencyPolicy, MutationEngine, MutationError, MutationKind, MutationResult, PolicyTable,
    ReconcilePolicy, Recovery, Settled,
};
pub use gateway::{
    CollectionGateway, GatewayError, GatewayResult, MemoryGateway, SqliteGateway, TimeoutGateway,
};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use model::board::{Board, BoardColumn, ProjectProgress};
pub use model::patch::RecordPatch;
pub use model::record::{
    EntityKind, Record, RecordId, RecordKey, RecordValidationError, TaskPriority, TaskStatus,
    UserId,
};
pub use notify::{Notification, NotificationChannel, NotificationId, Severity};
pub use session::Session;
pub use store::{RecordStore, StoreError, StoreHandle};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
