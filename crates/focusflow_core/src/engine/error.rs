//! Engine outcomes.
//!
//! A mutation ends in exactly one of: confirmed, locally rejected, or
//! remotely failed with local state already repaired. Nothing here is fatal.

use crate::gateway::GatewayError;
use crate::model::record::{EntityKind, RecordKey, RecordValidationError};
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MutationResult<T> = Result<T, MutationError>;

/// How local state was repaired after a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Prior values were re-applied.
    InversePatch,
    /// The collection was reloaded from the gateway.
    Refetch,
    /// The reload failed too; prior values were re-applied instead.
    RefetchFailed,
    /// The result arrived for a session or attempt that is no longer current.
    Skipped,
}

impl Recovery {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InversePatch => "inverse_patch",
            Self::Refetch => "refetch",
            Self::RefetchFailed => "refetch_failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Successful end state of an update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The remote call succeeded and the store reflects it.
    Confirmed,
    /// Nothing to change; no remote call was issued.
    Unchanged,
    /// The remote call succeeded, but a newer attempt or session owns the
    /// record, so the result was not reconciled.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// No user is signed in.
    SignedOut,
    Validation(RecordValidationError),
    /// Target no longer resolves to a stored record.
    StaleReference { entity: EntityKind, key: RecordKey },
    Store(StoreError),
    /// The remote call failed; `recovery` has already run.
    Remote {
        error: GatewayError,
        recovery: Recovery,
    },
}

impl MutationError {
    /// Reason surfaced to the user for remote failures.
    pub fn reason(&self) -> String {
        match self {
            Self::Remote { error, .. } => error.to_string(),
            other => other.to_string(),
        }
    }
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SignedOut => write!(f, "no user is signed in"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::StaleReference { entity, key } => {
                write!(f, "{entity} {key} is no longer available")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::Remote { error, recovery } => {
                write!(f, "remote call failed ({}): {error}", recovery.as_str())
            }
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Remote { error, .. } => Some(error),
            Self::SignedOut | Self::StaleReference { .. } => None,
        }
    }
}

impl From<RecordValidationError> for MutationError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for MutationError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
