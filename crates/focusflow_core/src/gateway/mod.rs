//! Remote collection gateway contracts and implementations.
//!
//! # Responsibility
//! - Define the typed CRUD seam between the mutation engine and the
//!   persistence service.
//! - Keep transport and storage details out of the engine.
//!
//! # Invariants
//! - Every call is scoped by the current user id; records of other users are
//!   never returned nor modified.
//! - Failures carry a human-readable reason via `Display`.
//! - Timeouts are reported as `GatewayError::Timeout`, like any other failure.

pub mod memory;
pub mod sqlite;
pub mod timeout;

use crate::db::DbError;
use crate::model::patch::RecordPatch;
use crate::model::record::{EntityKind, Record, RecordId, UserId};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

pub use memory::{GatewayCall, GatewayOp, HeldCall, MemoryGateway};
pub use sqlite::SqliteGateway;
pub use timeout::TimeoutGateway;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The service refused the request.
    Rejected(String),
    /// The service could not be reached.
    Unavailable(String),
    Timeout(Duration),
    NotFound(RecordId),
    /// The service answered with data that violates the record model.
    InvalidData(String),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "{reason}"),
            Self::Unavailable(reason) => write!(f, "{reason}"),
            Self::Timeout(after) => {
                write!(f, "request timed out after {}ms", after.as_millis())
            }
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid remote data: {message}"),
        }
    }
}

impl Error for GatewayError {}

impl From<DbError> for GatewayError {
    fn from(value: DbError) -> Self {
        Self::Unavailable(value.to_string())
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}

/// CRUD operations against one user's remote collections.
#[async_trait]
pub trait CollectionGateway: Send + Sync {
    /// Persists `draft` and returns it with server-assigned fields.
    async fn create(&self, user: &UserId, draft: &Record) -> GatewayResult<Record>;

    async fn update(
        &self,
        user: &UserId,
        kind: EntityKind,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> GatewayResult<()>;

    async fn delete(&self, user: &UserId, kind: EntityKind, id: &RecordId) -> GatewayResult<()>;

    /// Returns the authoritative collection of `kind` for `user`.
    async fn list(&self, user: &UserId, kind: EntityKind) -> GatewayResult<Vec<Record>>;
}

#[async_trait]
impl<G: CollectionGateway + ?Sized> CollectionGateway for Arc<G> {
    async fn create(&self, user: &UserId, draft: &Record) -> GatewayResult<Record> {
        (**self).create(user, draft).await
    }

    async fn update(
        &self,
        user: &UserId,
        kind: EntityKind,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> GatewayResult<()> {
        (**self).update(user, kind, id, patch).await
    }

    async fn delete(&self, user: &UserId, kind: EntityKind, id: &RecordId) -> GatewayResult<()> {
        (**self).delete(user, kind, id).await
    }

    async fn list(&self, user: &UserId, kind: EntityKind) -> GatewayResult<Vec<Record>> {
        (**self).list(user, kind).await
    }
}
