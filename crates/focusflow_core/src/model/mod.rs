//! Domain model for the task, note and project collections.
//!
//! # Responsibility
//! - Define canonical data structures used by store, engine and gateways.
//! - Keep one record shape for every collection view.
//!
//! # Invariants
//! - Every record is owned by exactly one user.
//! - Local validation happens here, before any network call.

pub mod board;
pub mod patch;
pub mod record;
