//! Timeout policy for remote calls.
//!
//! Wraps any gateway and turns a call that outlives the configured budget
//! into `GatewayError::Timeout`. The wrapped call is dropped at that point;
//! callers see the timeout exactly like any other failure.

use super::{CollectionGateway, GatewayError, GatewayResult};
use crate::model::patch::RecordPatch;
use crate::model::record::{EntityKind, Record, RecordId, UserId};
use async_trait::async_trait;
use log::warn;
use std::future::Future;
use std::time::Duration;

pub struct TimeoutGateway<G> {
    inner: G,
    timeout: Duration,
}

impl<G: CollectionGateway> TimeoutGateway<G> {
    pub fn new(inner: G, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = GatewayResult<T>> + Send,
    ) -> GatewayResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "event=gateway_timeout module=gateway op={} timeout_ms={}",
                    op,
                    self.timeout.as_millis()
                );
                Err(GatewayError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<G: CollectionGateway> CollectionGateway for TimeoutGateway<G> {
    async fn create(&self, user: &UserId, draft: &Record) -> GatewayResult<Record> {
        self.bounded("create", self.inner.create(user, draft)).await
    }

    async fn update(
        &self,
        user: &UserId,
        kind: EntityKind,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> GatewayResult<()> {
        self.bounded("update", self.inner.update(user, kind, id, patch))
            .await
    }

    async fn delete(&self, user: &UserId, kind: EntityKind, id: &RecordId) -> GatewayResult<()> {
        self.bounded("delete", self.inner.delete(user, kind, id)).await
    }

    async fn list(&self, user: &UserId, kind: EntityKind) -> GatewayResult<Vec<Record>> {
        self.bounded("list", self.inner.list(user, kind)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    #[tokio::test(start_paused = true)]
    async fn slow_call_is_reported_as_timeout() {
        let gateway = TimeoutGateway::new(
            MemoryGateway::new().with_latency(Duration::from_secs(30)),
            Duration::from_secs(10),
        );
        let err = gateway
            .list(&UserId::new("alice"), EntityKind::Note)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Timeout(Duration::from_secs(10)));
        assert_eq!(err.to_string(), "request timed out after 10000ms");
    }

    #[tokio::test(start_paused = true)]
    async fn fast_call_passes_through() {
        let gateway = TimeoutGateway::new(
            MemoryGateway::new().with_latency(Duration::from_millis(50)),
            Duration::from_secs(10),
        );
        let listed = gateway
            .list(&UserId::new("alice"), EntityKind::Note)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }
}
