//! In-memory record store, the render source for every view.
//!
//! # Responsibility
//! - Hold one collection per entity kind for the signed-in owner.
//! - Expose synchronous `load/apply/insert/remove` primitives to the engine.
//! - Derive read models (board, project progress) from current state.
//!
//! # Invariants
//! - Every stored record belongs to the current owner; foreign records are
//!   rejected on load and insert.
//! - Each write bumps `revision` exactly once and notifies subscribers.
//! - Access through `StoreHandle` holds the lock for one synchronous
//!   operation only, so readers never observe a half-applied mutation.

mod collection;

pub use collection::Collection;

use crate::model::board::{Board, ProjectProgress};
use crate::model::patch::RecordPatch;
use crate::model::record::{EntityKind, Record, RecordId, RecordKey, TaskStatus, UserId};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::watch;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No user is bound to the store.
    NoOwner,
    ForeignRecord {
        key: RecordKey,
        owner_id: UserId,
    },
    KindMismatch {
        key: RecordKey,
        expected: EntityKind,
        actual: EntityKind,
    },
    DuplicateKey(RecordKey),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoOwner => write!(f, "record store has no signed-in owner"),
            Self::ForeignRecord { key, owner_id } => {
                write!(f, "record {key} belongs to another user ({owner_id})")
            }
            Self::KindMismatch {
                key,
                expected,
                actual,
            } => write!(f, "record {key} is a {actual}, expected a {expected}"),
            Self::DuplicateKey(key) => write!(f, "record {key} is already stored"),
        }
    }
}

impl Error for StoreError {}

pub struct RecordStore {
    owner: Option<UserId>,
    collections: BTreeMap<EntityKind, Collection>,
    revision: u64,
    revision_tx: watch::Sender<u64>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            owner: None,
            collections: empty_collections(),
            revision: 0,
            revision_tx,
        }
    }

    /// Creates a store already bound to `owner`.
    pub fn for_owner(owner: UserId) -> Self {
        let mut store = Self::new();
        store.owner = Some(owner);
        store
    }

    pub fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    /// Rebinds the store to another owner. Switching owners drops every
    /// collection so nothing leaks across users.
    pub fn set_owner(&mut self, owner: Option<UserId>) {
        if self.owner == owner {
            return;
        }
        self.owner = owner;
        self.collections = empty_collections();
        self.bump("set_owner");
    }

    /// Drops every record and unbinds the owner.
    pub fn clear(&mut self) {
        self.owner = None;
        self.collections = empty_collections();
        self.bump("clear");
    }

    /// Replaces the whole collection of `kind`.
    ///
    /// The collection is left untouched when any record fails the owner or
    /// kind checks.
    pub fn load(&mut self, kind: EntityKind, records: Vec<Record>) -> StoreResult<usize> {
        for record in &records {
            self.check_record(kind, record)?;
        }
        let collection = self.collection_mut(kind);
        collection.replace_all(records);
        let count = collection.len();
        self.bump("load");
        debug!(
            "event=store_load module=store status=ok kind={} count={}",
            kind, count
        );
        Ok(count)
    }

    /// Merges `patch` into the record under `key`; returns the inverse patch.
    ///
    /// Returns `None` without writing when the key is absent.
    pub fn apply(
        &mut self,
        kind: EntityKind,
        key: &RecordKey,
        patch: &RecordPatch,
    ) -> Option<RecordPatch> {
        let Some(record) = self.collection_mut(kind).get_mut(key) else {
            warn!(
                "event=store_apply module=store status=stale_reference kind={} key={}",
                kind, key
            );
            return None;
        };
        let inverse = record.apply_patch(patch);
        self.bump("apply");
        Some(inverse)
    }

    pub fn insert(&mut self, record: Record) -> StoreResult<()> {
        self.check_record(record.kind, &record)?;
        let collection = self.collection_mut(record.kind);
        if collection.contains(&record.key) {
            return Err(StoreError::DuplicateKey(record.key));
        }
        collection.insert(record);
        self.bump("insert");
        Ok(())
    }

    pub fn remove(&mut self, kind: EntityKind, key: &RecordKey) -> Option<Record> {
        let removed = self.collection_mut(kind).remove(key);
        if removed.is_some() {
            self.bump("remove");
        }
        removed
    }

    /// Replaces the optimistic record under `pending` with its persisted form.
    ///
    /// Returns `false` and writes nothing when `pending` is no longer stored,
    /// which makes repeated promotion of the same result a no-op.
    pub fn promote(
        &mut self,
        kind: EntityKind,
        pending: &RecordKey,
        persisted: Record,
    ) -> StoreResult<bool> {
        self.check_record(kind, &persisted)?;
        let collection = self.collection_mut(kind);
        if collection.remove(pending).is_none() {
            return Ok(false);
        }
        collection.insert(persisted);
        self.bump("promote");
        Ok(true)
    }

    pub fn collection(&self, kind: EntityKind) -> Option<&Collection> {
        self.collections.get(&kind)
    }

    pub fn get(&self, kind: EntityKind, key: &RecordKey) -> Option<&Record> {
        self.collections.get(&kind)?.get(key)
    }

    /// Looks up a persisted task by its remote id.
    pub fn task(&self, id: &RecordId) -> Option<&Record> {
        self.get(EntityKind::Task, &RecordKey::from(id))
    }

    pub fn records(&self, kind: EntityKind) -> Vec<Record> {
        self.collections
            .get(&kind)
            .map(|collection| collection.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tasks(&self) -> Vec<Record> {
        self.records(EntityKind::Task)
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.collections.get(&kind).map_or(0, Collection::len)
    }

    pub fn board(&self) -> Board {
        match self.collections.get(&EntityKind::Task) {
            Some(tasks) => Board::from_tasks(tasks.iter()),
            None => Board::from_tasks(std::iter::empty()),
        }
    }

    pub fn project_progress(&self, project_id: &RecordId) -> ProjectProgress {
        let Some(tasks) = self.collections.get(&EntityKind::Task) else {
            return ProjectProgress::default();
        };
        tasks
            .iter()
            .filter(|task| task.project_id.as_ref() == Some(project_id))
            .fold(ProjectProgress::default(), |mut progress, task| {
                progress.total += 1;
                if task.status == Some(TaskStatus::Done) {
                    progress.done += 1;
                }
                progress
            })
    }

    /// Monotonic write counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Receiver that observes every revision bump; renderers re-read on change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    fn check_record(&self, kind: EntityKind, record: &Record) -> StoreResult<()> {
        let owner = self.owner.as_ref().ok_or(StoreError::NoOwner)?;
        if &record.owner_id != owner {
            return Err(StoreError::ForeignRecord {
                key: record.key.clone(),
                owner_id: record.owner_id.clone(),
            });
        }
        if record.kind != kind {
            return Err(StoreError::KindMismatch {
                key: record.key.clone(),
                expected: kind,
                actual: record.kind,
            });
        }
        Ok(())
    }

    fn collection_mut(&mut self, kind: EntityKind) -> &mut Collection {
        self.collections
            .entry(kind)
            .or_insert_with(|| Collection::new(kind))
    }

    fn bump(&mut self, op: &'static str) {
        self.revision += 1;
        self.revision_tx.send_replace(self.revision);
        debug!(
            "event=store_write module=store op={} revision={}",
            op, self.revision
        );
    }
}

fn empty_collections() -> BTreeMap<EntityKind, Collection> {
    EntityKind::ALL
        .iter()
        .map(|kind| (*kind, Collection::new(*kind)))
        .collect()
}

/// Shared, cloneable access to one session's store.
#[derive(Clone, Default)]
pub struct StoreHandle {
    inner: Arc<Mutex<RecordStore>>,
}

impl StoreHandle {
    pub fn new(store: RecordStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Runs `f` against a consistent snapshot of the store.
    pub fn read<R>(&self, f: impl FnOnce(&RecordStore) -> R) -> R {
        let guard = self.inner.lock();
        f(&*guard)
    }

    /// Runs one synchronous write against the store.
    pub fn write<R>(&self, f: impl FnOnce(&mut RecordStore) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    pub fn board(&self) -> Board {
        self.read(RecordStore::board)
    }

    pub fn records(&self, kind: EntityKind) -> Vec<Record> {
        self.read(|store| store.records(kind))
    }

    pub fn tasks(&self) -> Vec<Record> {
        self.read(RecordStore::tasks)
    }

    pub fn get(&self, kind: EntityKind, key: &RecordKey) -> Option<Record> {
        self.read(|store| store.get(kind, key).cloned())
    }

    pub fn task(&self, id: &RecordId) -> Option<Record> {
        self.read(|store| store.task(id).cloned())
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.read(RecordStore::subscribe)
    }
}
