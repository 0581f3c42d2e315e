//! Mutation kinds, reconciliation policies and the in-flight ledger.

use crate::model::patch::RecordPatch;
use crate::model::record::{EntityKind, Record, RecordKey, UserId};
use std::collections::HashMap;

/// What an attempt does to its target record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    UpdateFields,
    /// Status-only update issued by a board drop.
    UpdateStatus,
    Delete,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::UpdateFields => "update_fields",
            Self::UpdateStatus => "update_status",
            Self::Delete => "delete",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::UpdateFields => "update",
            Self::UpdateStatus => "move",
            Self::Delete => "delete",
        }
    }

    /// User-facing failure text, e.g. `Failed to move task: network error`.
    pub fn failure_message(self, entity: EntityKind, reason: &str) -> String {
        format!("Failed to {} {}: {}", self.verb(), entity.as_str(), reason)
    }

    /// User-facing success text; only creates and deletes announce success.
    pub fn success_message(self, entity: EntityKind) -> Option<String> {
        match self {
            Self::Create => Some(format!("{} created successfully", entity.label())),
            Self::Delete => Some(format!("{} deleted successfully", entity.label())),
            Self::UpdateFields | Self::UpdateStatus => None,
        }
    }
}

/// How local state is repaired after a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// Re-apply the prior values captured at optimistic apply.
    InversePatch,
    /// Reload the whole collection from the gateway.
    Refetch,
}

impl ReconcilePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InversePatch => "inverse_patch",
            Self::Refetch => "refetch",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inverse_patch" | "inverse-patch" => Some(Self::InversePatch),
            "refetch" => Some(Self::Refetch),
            _ => None,
        }
    }
}

/// Reconciliation policy per mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyTable {
    pub create: ReconcilePolicy,
    pub update_fields: ReconcilePolicy,
    pub update_status: ReconcilePolicy,
    pub delete: ReconcilePolicy,
}

impl Default for PolicyTable {
    /// A failed status write may coincide with other writes to the same task,
    /// so drops are repaired from authoritative state.
    fn default() -> Self {
        Self {
            create: ReconcilePolicy::InversePatch,
            update_fields: ReconcilePolicy::InversePatch,
            update_status: ReconcilePolicy::Refetch,
            delete: ReconcilePolicy::InversePatch,
        }
    }
}

impl PolicyTable {
    pub fn for_kind(&self, kind: MutationKind) -> ReconcilePolicy {
        match kind {
            MutationKind::Create => self.create,
            MutationKind::UpdateFields => self.update_fields,
            MutationKind::UpdateStatus => self.update_status,
            MutationKind::Delete => self.delete,
        }
    }

    pub fn with(mut self, kind: MutationKind, policy: ReconcilePolicy) -> Self {
        match kind {
            MutationKind::Create => self.create = policy,
            MutationKind::UpdateFields => self.update_fields = policy,
            MutationKind::UpdateStatus => self.update_status = policy,
            MutationKind::Delete => self.delete = policy,
        }
        self
    }
}

/// Which attempt reconciles when several target the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    /// Every result is reconciled; the last one to resolve decides.
    #[default]
    LastResolverWins,
    /// Only the most recently issued attempt per record reconciles.
    LatestIssuedWins,
}

impl ConcurrencyPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastResolverWins => "last_resolver_wins",
            Self::LatestIssuedWins => "latest_issued_wins",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "last_resolver_wins" => Some(Self::LastResolverWins),
            "latest_issued_wins" => Some(Self::LatestIssuedWins),
            _ => None,
        }
    }
}

/// Captured record state on one side of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Snapshot {
    Patch(RecordPatch),
    Record(Record),
    Absent,
}

/// One attempt between optimistic apply and reconciliation.
#[derive(Debug, Clone)]
pub(crate) struct PendingMutation {
    pub target: RecordKey,
    pub entity: EntityKind,
    pub kind: MutationKind,
    pub prior: Snapshot,
    pub proposed: Snapshot,
    pub user: UserId,
    pub epoch: u64,
    pub seq: u64,
}

impl PendingMutation {
    pub fn policy(&self, table: &PolicyTable) -> ReconcilePolicy {
        table.for_kind(self.kind)
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    latest: u64,
    outstanding: usize,
}

/// Sequence numbers of issued attempts, per target record.
#[derive(Debug, Default)]
pub(crate) struct MutationLedger {
    next_seq: u64,
    slots: HashMap<RecordKey, Slot>,
}

impl MutationLedger {
    pub fn issue(&mut self, target: &RecordKey) -> u64 {
        self.next_seq += 1;
        let slot = self.slots.entry(target.clone()).or_insert(Slot {
            latest: 0,
            outstanding: 0,
        });
        slot.latest = self.next_seq;
        slot.outstanding += 1;
        self.next_seq
    }

    pub fn is_latest(&self, target: &RecordKey, seq: u64) -> bool {
        self.slots.get(target).map_or(true, |slot| slot.latest == seq)
    }

    /// Marks one attempt on `target` resolved. The record is forgotten once
    /// nothing targets it anymore.
    pub fn settle(&mut self, target: &RecordKey) {
        let Some(slot) = self.slots.get_mut(target) else {
            return;
        };
        slot.outstanding = slot.outstanding.saturating_sub(1);
        if slot.outstanding == 0 {
            self.slots.remove(target);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.slots.values().map(|slot| slot.outstanding).sum()
    }

    pub fn reset(&mut self) {
        self.slots.clear();
    }
}
