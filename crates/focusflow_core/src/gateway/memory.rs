//! In-process gateway with scriptable failures and held calls.
//!
//! Behaves like a well-formed remote collection: ids are assigned on create,
//! every call is scoped by user, and writes become visible to `list`. Tests
//! use `fail_next` to inject a failure into the next matching call and
//! `hold_next` to park a call until they decide how it resolves, which is how
//! completion order is controlled independently of issue order.

use super::{CollectionGateway, GatewayError, GatewayResult};
use crate::model::patch::RecordPatch;
use crate::model::record::{EntityKind, Record, RecordId, RecordKey, UserId};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Create,
    Update,
    Delete,
    List,
}

/// One recorded call, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub op: GatewayOp,
    pub kind: EntityKind,
    pub user: UserId,
    pub id: Option<RecordId>,
}

#[derive(Debug)]
enum HoldDecision {
    Proceed,
    Fail(GatewayError),
}

/// A parked gateway call. Dropping it without a decision lets the call proceed.
#[derive(Debug)]
pub struct HeldCall {
    op: GatewayOp,
    decision: oneshot::Sender<HoldDecision>,
}

impl HeldCall {
    pub fn op(&self) -> GatewayOp {
        self.op
    }

    /// Lets the parked call complete normally.
    pub fn release(self) {
        let _ = self.decision.send(HoldDecision::Proceed);
    }

    /// Resolves the parked call with `error`; its write is never applied.
    pub fn fail(self, error: GatewayError) {
        let _ = self.decision.send(HoldDecision::Fail(error));
    }
}

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<(EntityKind, RecordId), Record>,
    failures: VecDeque<(GatewayOp, GatewayError)>,
    holds: VecDeque<(GatewayOp, oneshot::Receiver<HoldDecision>)>,
    calls: Vec<GatewayCall>,
    next_id: u64,
}

#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency` before it resolves.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Stores `record` as authoritative remote state.
    ///
    /// Pending records are assigned an id first; the stored form is returned.
    pub fn seed(&self, record: Record) -> Record {
        let mut state = self.state.lock();
        let record = match record.key.remote_id() {
            Some(_) => record,
            None => {
                let id = next_record_id(&mut state, record.kind);
                record.with_key(RecordKey::Remote(id))
            }
        };
        if let Some(id) = record.id() {
            state
                .records
                .insert((record.kind, id.clone()), record.clone());
        }
        record
    }

    /// Authoritative copy of one record, regardless of owner.
    pub fn record(&self, kind: EntityKind, id: &RecordId) -> Option<Record> {
        self.state.lock().records.get(&(kind, id.clone())).cloned()
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: GatewayOp, error: GatewayError) {
        self.state.lock().failures.push_back((op, error));
    }

    /// Parks the next call of `op` until the returned handle decides.
    pub fn hold_next(&self, op: GatewayOp) -> HeldCall {
        let (decision, rx) = oneshot::channel();
        self.state.lock().holds.push_back((op, rx));
        HeldCall { op, decision }
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: GatewayOp) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    async fn gate(&self, call: GatewayCall) -> GatewayResult<()> {
        let op = call.op;
        let hold = {
            let mut state = self.state.lock();
            debug!(
                "event=gateway_call module=gateway.memory op={:?} kind={}",
                call.op, call.kind
            );
            state.calls.push(call);
            state
                .holds
                .iter()
                .position(|(held_op, _)| *held_op == op)
                .and_then(|index| state.holds.remove(index))
                .map(|(_, rx)| rx)
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(rx) = hold {
            if let Ok(HoldDecision::Fail(error)) = rx.await {
                return Err(error);
            }
        }

        let mut state = self.state.lock();
        let scripted = state
            .failures
            .iter()
            .position(|(failing_op, _)| *failing_op == op)
            .and_then(|index| state.failures.remove(index));
        match scripted {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}

fn next_record_id(state: &mut MemoryState, kind: EntityKind) -> RecordId {
    state.next_id += 1;
    RecordId::new(format!("{}-{}", kind.as_str(), state.next_id))
}

#[async_trait]
impl CollectionGateway for MemoryGateway {
    async fn create(&self, user: &UserId, draft: &Record) -> GatewayResult<Record> {
        self.gate(GatewayCall {
            op: GatewayOp::Create,
            kind: draft.kind,
            user: user.clone(),
            id: None,
        })
        .await?;

        draft
            .validate()
            .map_err(|err| GatewayError::Rejected(err.to_string()))?;

        let mut state = self.state.lock();
        let id = next_record_id(&mut state, draft.kind);
        let mut persisted = draft.clone().with_key(RecordKey::Remote(id.clone()));
        persisted.owner_id = user.clone();
        state
            .records
            .insert((draft.kind, id), persisted.clone());
        Ok(persisted)
    }

    async fn update(
        &self,
        user: &UserId,
        kind: EntityKind,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> GatewayResult<()> {
        self.gate(GatewayCall {
            op: GatewayOp::Update,
            kind,
            user: user.clone(),
            id: Some(id.clone()),
        })
        .await?;

        let mut state = self.state.lock();
        match state.records.get_mut(&(kind, id.clone())) {
            Some(record) if &record.owner_id == user => {
                record.apply_patch(patch);
                Ok(())
            }
            _ => Err(GatewayError::NotFound(id.clone())),
        }
    }

    async fn delete(&self, user: &UserId, kind: EntityKind, id: &RecordId) -> GatewayResult<()> {
        self.gate(GatewayCall {
            op: GatewayOp::Delete,
            kind,
            user: user.clone(),
            id: Some(id.clone()),
        })
        .await?;

        let mut state = self.state.lock();
        let key = (kind, id.clone());
        match state.records.get(&key) {
            Some(record) if &record.owner_id == user => {
                state.records.remove(&key);
                Ok(())
            }
            _ => Err(GatewayError::NotFound(id.clone())),
        }
    }

    async fn list(&self, user: &UserId, kind: EntityKind) -> GatewayResult<Vec<Record>> {
        self.gate(GatewayCall {
            op: GatewayOp::List,
            kind,
            user: user.clone(),
            id: None,
        })
        .await?;

        let state = self.state.lock();
        Ok(state
            .records
            .values()
            .filter(|record| record.kind == kind && &record.owner_id == user)
            .cloned()
            .collect())
    }
}
