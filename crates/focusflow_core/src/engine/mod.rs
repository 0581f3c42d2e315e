//! Local-first mutation engine.
//!
//! # Responsibility
//! - Validate, apply optimistically, issue one remote call, reconcile.
//! - Surface every outcome through the notification channel.
//!
//! # Invariants
//! - A rejected mutation never touches the store nor the gateway.
//! - The optimistic state is visible before the remote call is issued.
//! - A remote failure always repairs local state (inverse patch or refetch)
//!   and raises an error notification carrying the failure reason.
//! - Results that arrive after the session changed are discarded.
//! - Reads through the engine always reflect the session's current user; a
//!   sign-out or user switch on any clone of the session empties the store.
//! - Confirming the same result twice leaves the store as one confirm does.
//! - A refetch replaces the whole collection, so other optimistic creates or
//!   deletes of that kind drop out of view until their own calls resolve.
//! - No remote call is retried.

mod error;
mod mutation;

pub use error::{MutationError, MutationResult, Recovery, Settled};
pub use mutation::{ConcurrencyPolicy, MutationKind, PolicyTable, ReconcilePolicy};

use crate::config::EngineConfig;
use crate::gateway::{CollectionGateway, GatewayError};
use crate::model::board::Board;
use crate::model::patch::RecordPatch;
use crate::model::record::{
    EntityKind, Record, RecordId, RecordKey, RecordValidationError, TaskPriority, TaskStatus,
    UserId,
};
use crate::notify::NotificationChannel;
use crate::session::Session;
use crate::store::{StoreHandle, StoreResult};
use log::{debug, info, warn};
use mutation::{MutationLedger, PendingMutation, Snapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Where a resolved attempt stands relative to newer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Standing {
    Current,
    /// A newer attempt on the same record owns reconciliation.
    Superseded,
    /// The user signed out or switched since the attempt was issued.
    SessionChanged,
}

enum Optimistic {
    Missing,
    Unchanged,
    Applied {
        changes: RecordPatch,
        inverse: RecordPatch,
    },
}

/// Applies mutations locally first and reconciles them with the gateway.
pub struct MutationEngine {
    session: Session,
    session_changes: Mutex<watch::Receiver<Option<UserId>>>,
    store: StoreHandle,
    gateway: Arc<dyn CollectionGateway>,
    notifications: NotificationChannel,
    config: EngineConfig,
    ledger: Mutex<MutationLedger>,
}

impl MutationEngine {
    /// Engine over shared collaborators; the store is bound to the current user.
    pub fn new(
        session: Session,
        store: StoreHandle,
        gateway: Arc<dyn CollectionGateway>,
        notifications: NotificationChannel,
        config: EngineConfig,
    ) -> Self {
        let session_changes = Mutex::new(session.watch());
        if let Some(user) = session.current_user_id() {
            store.write(|store| store.set_owner(Some(user)));
        }
        Self {
            session,
            session_changes,
            store,
            gateway,
            notifications,
            config,
            ledger: Mutex::new(MutationLedger::default()),
        }
    }

    /// Engine with a fresh store and a channel using the configured TTL.
    pub fn with_config(
        session: Session,
        gateway: Arc<dyn CollectionGateway>,
        config: EngineConfig,
    ) -> Self {
        let notifications = NotificationChannel::new(config.notification_ttl);
        Self::new(session, StoreHandle::default(), gateway, notifications, config)
    }

    /// Session the engine scopes every call to.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Store scoped to the session's current user.
    pub fn store(&self) -> &StoreHandle {
        self.sync_session();
        &self.store
    }

    pub fn notifications(&self) -> &NotificationChannel {
        &self.notifications
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn board(&self) -> Board {
        self.store().board()
    }

    /// Remote calls issued and not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.sync_session();
        self.ledger.lock().in_flight()
    }

    /// Signs `user` in; switching from another user empties the store.
    pub fn sign_in(&self, user: UserId) {
        self.session.sign_in(user);
        self.sync_session();
    }

    /// Ends the session and tears down every user-scoped collection.
    pub fn sign_out(&self) {
        self.session.sign_out();
        self.sync_session();
    }

    /// Inserts `draft` optimistically and persists it.
    ///
    /// The draft is re-owned by the signed-in user and keyed as pending. On
    /// success the pending record is replaced with the server's copy, which is
    /// also returned.
    pub async fn create(&self, mut draft: Record) -> MutationResult<Record> {
        let (user, epoch) = self.begin()?;
        let entity = draft.kind;
        draft.owner_id = user.clone();
        if !draft.key.is_pending() {
            draft.key = RecordKey::pending();
        }
        if let Err(err) = draft.validate() {
            return Err(self.reject(entity, MutationKind::Create, err));
        }

        self.store.write(|store| store.insert(draft.clone()))?;
        let pending = self.track(
            draft.key.clone(),
            entity,
            MutationKind::Create,
            Snapshot::Absent,
            Snapshot::Record(draft.clone()),
            user,
            epoch,
        );

        let result = self.gateway.create(&pending.user, &draft).await;
        let standing = self.standing(&pending);
        match result {
            Ok(persisted) => {
                if standing == Standing::Current {
                    self.promote(&pending, persisted.clone())?;
                    self.announce_success(&pending);
                }
                self.log_settled(&pending, standing);
                Ok(persisted)
            }
            Err(error) => Err(self.fail(pending, standing, error).await),
        }
    }

    pub async fn create_task(
        &self,
        title: impl Into<String>,
        priority: TaskPriority,
    ) -> MutationResult<Record> {
        let owner = self.session.current_user_id().ok_or(MutationError::SignedOut)?;
        self.create(Record::task(owner, title, priority)).await
    }

    pub async fn create_note(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> MutationResult<Record> {
        let owner = self.session.current_user_id().ok_or(MutationError::SignedOut)?;
        self.create(Record::note(owner, title, content)).await
    }

    pub async fn create_project(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> MutationResult<Record> {
        let owner = self.session.current_user_id().ok_or(MutationError::SignedOut)?;
        self.create(Record::project(owner, name, description)).await
    }

    /// Applies `patch` to one persisted record and persists the fields that
    /// actually change.
    pub async fn update_fields(
        &self,
        entity: EntityKind,
        id: &RecordId,
        patch: RecordPatch,
    ) -> MutationResult<Settled> {
        self.update(entity, id, patch, MutationKind::UpdateFields)
            .await
    }

    /// Board drop: moves task `id` into the `target` column.
    ///
    /// An unknown id is rejected silently with `StaleReference`. Dropping a
    /// task onto its own column issues no remote call.
    pub async fn move_task(&self, id: &RecordId, target: TaskStatus) -> MutationResult<Settled> {
        self.update(
            EntityKind::Task,
            id,
            RecordPatch::status(target),
            MutationKind::UpdateStatus,
        )
        .await
    }

    /// Removes one record optimistically and deletes it remotely.
    pub async fn delete(&self, entity: EntityKind, id: &RecordId) -> MutationResult<Settled> {
        let (user, epoch) = self.begin()?;
        let key = RecordKey::from(id);
        let Some(removed) = self.store.write(|store| store.remove(entity, &key)) else {
            return Err(self.stale(entity, key, MutationKind::Delete));
        };

        let pending = self.track(
            key,
            entity,
            MutationKind::Delete,
            Snapshot::Record(removed),
            Snapshot::Absent,
            user,
            epoch,
        );

        let result = self.gateway.delete(&pending.user, entity, id).await;
        let standing = self.standing(&pending);
        match result {
            Ok(()) => Ok(self.confirm(&pending, standing)),
            Err(error) => Err(self.fail(pending, standing, error).await),
        }
    }

    /// Replaces the local collection of `kind` with the authoritative one.
    ///
    /// Returns the number of records loaded, or zero when the session changed
    /// while the list was in flight.
    pub async fn refresh(&self, kind: EntityKind) -> MutationResult<usize> {
        let (user, epoch) = self.begin()?;
        let records = match self.gateway.list(&user, kind).await {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    "event=collection_refresh module=engine status=error kind={} error={}",
                    kind, error
                );
                if self.session.epoch() == epoch {
                    self.notifications
                        .error(format!("Failed to load {}s: {}", kind.as_str(), error));
                }
                return Err(MutationError::Remote {
                    error,
                    recovery: Recovery::Skipped,
                });
            }
        };

        if self.session.epoch() != epoch {
            info!(
                "event=collection_refresh module=engine status=discarded reason=session_changed kind={}",
                kind
            );
            return Ok(0);
        }
        let loaded = self.store.write(|store| store.load(kind, records))?;
        info!(
            "event=collection_refresh module=engine status=ok kind={} count={}",
            kind, loaded
        );
        Ok(loaded)
    }

    /// Refreshes every collection; stops at the first failure.
    pub async fn refresh_all(&self) -> MutationResult<usize> {
        let mut loaded = 0;
        for kind in EntityKind::ALL {
            loaded += self.refresh(kind).await?;
        }
        Ok(loaded)
    }

    async fn update(
        &self,
        entity: EntityKind,
        id: &RecordId,
        patch: RecordPatch,
        kind: MutationKind,
    ) -> MutationResult<Settled> {
        let (user, epoch) = self.begin()?;
        if let Err(err) = patch.validate_for(entity) {
            return Err(self.reject(entity, kind, err));
        }

        let key = RecordKey::from(id);
        let optimistic = self.store.write(|store| {
            let Some(record) = store.get(entity, &key) else {
                return Optimistic::Missing;
            };
            let changes = record.changes_from(&patch);
            if changes.is_empty() {
                return Optimistic::Unchanged;
            }
            match store.apply(entity, &key, &changes) {
                Some(inverse) => Optimistic::Applied { changes, inverse },
                None => Optimistic::Missing,
            }
        });

        let (changes, inverse) = match optimistic {
            Optimistic::Missing => return Err(self.stale(entity, key, kind)),
            Optimistic::Unchanged => {
                debug!(
                    "event=mutation_skipped module=engine kind={} entity={} key={} reason=unchanged",
                    kind.as_str(),
                    entity,
                    key
                );
                return Ok(Settled::Unchanged);
            }
            Optimistic::Applied { changes, inverse } => (changes, inverse),
        };

        let pending = self.track(
            key,
            entity,
            kind,
            Snapshot::Patch(inverse),
            Snapshot::Patch(changes.clone()),
            user,
            epoch,
        );

        let result = self
            .gateway
            .update(&pending.user, entity, id, &changes)
            .await;
        let standing = self.standing(&pending);
        match result {
            Ok(()) => Ok(self.confirm(&pending, standing)),
            Err(error) => Err(self.fail(pending, standing, error).await),
        }
    }

    /// Resolves the signed-in user and binds the store to them.
    fn begin(&self) -> MutationResult<(UserId, u64)> {
        self.sync_session();
        let Some((user, epoch)) = self.session.current() else {
            warn!("event=mutation_rejected module=engine reason=signed_out");
            return Err(MutationError::SignedOut);
        };
        self.store.write(|store| store.set_owner(Some(user.clone())));
        Ok((user, epoch))
    }

    /// Empties and re-binds the store when the session changed identity since
    /// the engine last looked.
    fn sync_session(&self) {
        let current = {
            let mut changes = self.session_changes.lock();
            if !changes.has_changed().unwrap_or(false) {
                return;
            }
            let current = changes.borrow_and_update().clone();
            current
        };
        // Optimistic state of the previous session never survives a change.
        self.store.write(|store| {
            store.clear();
            store.set_owner(current.clone());
        });
        self.ledger.lock().reset();
        info!(
            "event=engine_session_bind module=engine status=ok signed_in={}",
            current.is_some()
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn track(
        &self,
        target: RecordKey,
        entity: EntityKind,
        kind: MutationKind,
        prior: Snapshot,
        proposed: Snapshot,
        user: UserId,
        epoch: u64,
    ) -> PendingMutation {
        let seq = self.ledger.lock().issue(&target);
        debug!(
            "event=mutation_issued module=engine kind={} entity={} key={} seq={} fields={}",
            kind.as_str(),
            entity,
            target,
            seq,
            match &proposed {
                Snapshot::Patch(patch) => patch.field_names().join(","),
                Snapshot::Record(_) => "*".to_string(),
                Snapshot::Absent => "-".to_string(),
            }
        );
        PendingMutation {
            target,
            entity,
            kind,
            prior,
            proposed,
            user,
            epoch,
            seq,
        }
    }

    fn standing(&self, pending: &PendingMutation) -> Standing {
        let latest = {
            let mut ledger = self.ledger.lock();
            let latest = ledger.is_latest(&pending.target, pending.seq);
            ledger.settle(&pending.target);
            latest
        };
        if self.session.epoch() != pending.epoch {
            Standing::SessionChanged
        } else if !latest && self.config.concurrency == ConcurrencyPolicy::LatestIssuedWins {
            Standing::Superseded
        } else {
            Standing::Current
        }
    }

    /// Re-applies the confirmed proposal so the last resolver's value is the
    /// one left in the store. Fields already holding the proposed value are
    /// not written again.
    fn confirm(&self, pending: &PendingMutation, standing: Standing) -> Settled {
        self.log_settled(pending, standing);
        if standing != Standing::Current {
            return Settled::Superseded;
        }
        match &pending.proposed {
            Snapshot::Patch(changes) => {
                self.store.write(|store| {
                    let outstanding = store
                        .get(pending.entity, &pending.target)
                        .map(|record| record.changes_from(changes))?;
                    if outstanding.is_empty() {
                        return None;
                    }
                    store.apply(pending.entity, &pending.target, &outstanding)
                });
            }
            Snapshot::Absent => {
                self.store
                    .write(|store| store.remove(pending.entity, &pending.target));
            }
            Snapshot::Record(_) => {}
        }
        self.announce_success(pending);
        Settled::Confirmed
    }

    /// Swaps the pending record for the persisted one.
    ///
    /// When a refetch already dropped the pending copy, the persisted record is
    /// inserted unless the refetch brought it in too.
    fn promote(&self, pending: &PendingMutation, persisted: Record) -> MutationResult<()> {
        let entity = pending.entity;
        let promoted: StoreResult<()> = self.store.write(|store| {
            if store.promote(entity, &pending.target, persisted.clone())? {
                return Ok(());
            }
            if store.get(entity, &persisted.key).is_none() {
                store.insert(persisted)?;
            }
            Ok(())
        });
        if let Err(err) = &promoted {
            warn!(
                "event=mutation_promote module=engine status=error entity={} key={} error={}",
                entity, pending.target, err
            );
            self.store
                .write(|store| store.remove(entity, &pending.target));
        }
        promoted.map_err(MutationError::Store)
    }

    async fn fail(
        &self,
        pending: PendingMutation,
        standing: Standing,
        error: GatewayError,
    ) -> MutationError {
        let recovery = match standing {
            Standing::Current => self.recover(&pending).await,
            Standing::Superseded | Standing::SessionChanged => Recovery::Skipped,
        };
        warn!(
            "event=mutation_failed module=engine kind={} entity={} key={} seq={} recovery={} error={}",
            pending.kind.as_str(),
            pending.entity,
            pending.target,
            pending.seq,
            recovery.as_str(),
            error
        );
        if standing != Standing::SessionChanged {
            self.notifications.error(
                pending
                    .kind
                    .failure_message(pending.entity, &error.to_string()),
            );
        }
        MutationError::Remote { error, recovery }
    }

    async fn recover(&self, pending: &PendingMutation) -> Recovery {
        match pending.policy(&self.config.policies) {
            ReconcilePolicy::InversePatch => {
                self.revert(pending);
                Recovery::InversePatch
            }
            ReconcilePolicy::Refetch => {
                let listed = self.gateway.list(&pending.user, pending.entity).await;
                if self.session.epoch() != pending.epoch {
                    return Recovery::Skipped;
                }
                let reloaded = match listed {
                    Ok(records) => self
                        .store
                        .write(|store| store.load(pending.entity, records))
                        .map_err(|err| err.to_string()),
                    Err(err) => Err(err.to_string()),
                };
                match reloaded {
                    Ok(_) => Recovery::Refetch,
                    Err(reason) => {
                        warn!(
                            "event=mutation_refetch module=engine status=error entity={} error={}",
                            pending.entity, reason
                        );
                        self.revert(pending);
                        Recovery::RefetchFailed
                    }
                }
            }
        }
    }

    /// Restores the prior values captured at optimistic apply.
    fn revert(&self, pending: &PendingMutation) {
        let entity = pending.entity;
        let key = &pending.target;
        self.store.write(|store| match &pending.prior {
            Snapshot::Patch(inverse) => {
                store.apply(entity, key, inverse);
            }
            Snapshot::Record(record) => {
                if store.get(entity, key).is_none() {
                    if let Err(err) = store.insert(record.clone()) {
                        warn!(
                            "event=mutation_revert module=engine status=error entity={} key={} error={}",
                            entity, key, err
                        );
                    }
                }
            }
            Snapshot::Absent => {
                store.remove(entity, key);
            }
        });
    }

    fn reject(
        &self,
        entity: EntityKind,
        kind: MutationKind,
        err: RecordValidationError,
    ) -> MutationError {
        warn!(
            "event=mutation_rejected module=engine kind={} entity={} reason=validation error={}",
            kind.as_str(),
            entity,
            err
        );
        self.notifications.error(err.to_string());
        MutationError::Validation(err)
    }

    fn stale(&self, entity: EntityKind, key: RecordKey, kind: MutationKind) -> MutationError {
        warn!(
            "event=mutation_rejected module=engine kind={} entity={} key={} reason=stale_reference",
            kind.as_str(),
            entity,
            key
        );
        MutationError::StaleReference { entity, key }
    }

    fn announce_success(&self, pending: &PendingMutation) {
        if let Some(message) = pending.kind.success_message(pending.entity) {
            self.notifications.success(message);
        }
    }

    fn log_settled(&self, pending: &PendingMutation, standing: Standing) {
        let status = match standing {
            Standing::Current => "ok",
            Standing::Superseded => "superseded",
            Standing::SessionChanged => "discarded",
        };
        info!(
            "event=mutation_settled module=engine status={} kind={} entity={} key={} seq={}",
            status,
            pending.kind.as_str(),
            pending.entity,
            pending.target,
            pending.seq
        );
    }
}
