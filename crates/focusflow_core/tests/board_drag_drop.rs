use focusflow_core::gateway::{GatewayOp, MemoryGateway};
use focusflow_core::{
    ConcurrencyPolicy, EngineConfig, EntityKind, GatewayError, MutationEngine, MutationError,
    MutationKind, Record, RecordId, RecordKey, ReconcilePolicy, Recovery, Session, Settled,
    Severity, TaskPriority, TaskStatus, UserId,
};
use std::sync::Arc;

fn alice() -> UserId {
    UserId::new("alice")
}

/// Engine signed in as alice with one `todo` task loaded from the gateway.
async fn board_with_one_task(config: EngineConfig) -> (Arc<MemoryGateway>, MutationEngine, RecordId) {
    let gateway = Arc::new(MemoryGateway::new());
    let task = gateway.seed(Record::task(alice(), "Design system draft", TaskPriority::High));
    let id = task.id().cloned().unwrap();

    let engine = MutationEngine::with_config(Session::signed_in(alice()), gateway.clone(), config);
    engine.refresh(EntityKind::Task).await.unwrap();
    (gateway, engine, id)
}

async fn until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}

fn status_of(engine: &MutationEngine, id: &RecordId) -> Option<TaskStatus> {
    engine.store().task(id).and_then(|task| task.status)
}

#[tokio::test]
async fn drop_on_done_column_is_persisted_without_error() {
    let (gateway, engine, id) = board_with_one_task(EngineConfig::default()).await;

    let settled = engine.move_task(&id, TaskStatus::Done).await.unwrap();

    assert_eq!(settled, Settled::Confirmed);
    assert_eq!(status_of(&engine, &id), Some(TaskStatus::Done));
    assert_eq!(
        gateway.record(EntityKind::Task, &id).unwrap().status,
        Some(TaskStatus::Done)
    );
    assert!(engine
        .notifications()
        .snapshot()
        .iter()
        .all(|notification| notification.severity != Severity::Error));

    let board = engine.board();
    assert_eq!(board.locate(&RecordKey::from(&id)), Some(TaskStatus::Done));
    assert!(board.column(TaskStatus::Todo).unwrap().tasks.is_empty());
}

#[tokio::test]
async fn failed_drop_refetches_authoritative_status() {
    let (gateway, engine, id) = board_with_one_task(EngineConfig::default()).await;
    gateway.fail_next(
        GatewayOp::Update,
        GatewayError::Unavailable("network error".to_string()),
    );

    let err = engine.move_task(&id, TaskStatus::Done).await.unwrap_err();

    assert_eq!(
        err,
        MutationError::Remote {
            error: GatewayError::Unavailable("network error".to_string()),
            recovery: Recovery::Refetch,
        }
    );
    assert_eq!(status_of(&engine, &id), Some(TaskStatus::Todo));
    assert_eq!(gateway.call_count(GatewayOp::List), 2);

    let notifications = engine.notifications().snapshot();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].severity, Severity::Error);
    assert!(notifications[0].message.contains("network error"));
}

#[tokio::test]
async fn drop_is_visible_before_the_remote_call_resolves() {
    let (gateway, engine, id) = board_with_one_task(EngineConfig::default()).await;
    let held = gateway.hold_next(GatewayOp::Update);

    let engine_ref = &engine;
    let gateway_ref = &*gateway;
    let id_ref = &id;
    let (settled, ()) = tokio::join!(engine.move_task(&id, TaskStatus::Done), async move {
        until(|| gateway_ref.call_count(GatewayOp::Update) == 1).await;
        assert_eq!(
            engine_ref.board().locate(&RecordKey::from(id_ref)),
            Some(TaskStatus::Done)
        );
        assert_eq!(
            gateway_ref.record(EntityKind::Task, id_ref).unwrap().status,
            Some(TaskStatus::Todo)
        );
        held.release();
    });

    assert_eq!(settled.unwrap(), Settled::Confirmed);
}

#[tokio::test]
async fn concurrent_drops_leave_the_last_resolved_status() {
    let (gateway, engine, id) = board_with_one_task(EngineConfig::default()).await;
    let first = gateway.hold_next(GatewayOp::Update);
    let second = gateway.hold_next(GatewayOp::Update);

    let engine_ref = &engine;
    let gateway_ref = &*gateway;
    let id_ref = &id;
    let (to_in_progress, to_done, ()) = tokio::join!(
        engine.move_task(&id, TaskStatus::InProgress),
        async {
            until(|| gateway_ref.call_count(GatewayOp::Update) == 1).await;
            engine_ref.move_task(id_ref, TaskStatus::Done).await
        },
        async move {
            until(|| gateway_ref.call_count(GatewayOp::Update) == 2).await;
            assert_eq!(status_of(engine_ref, id_ref), Some(TaskStatus::Done));
            // Resolve in reverse issue order.
            second.release();
            until(|| engine_ref.in_flight() == 1).await;
            first.release();
        }
    );

    assert_eq!(to_in_progress.unwrap(), Settled::Confirmed);
    assert_eq!(to_done.unwrap(), Settled::Confirmed);
    assert_eq!(status_of(&engine, &id), Some(TaskStatus::InProgress));
    assert_eq!(
        gateway.record(EntityKind::Task, &id).unwrap().status,
        Some(TaskStatus::InProgress)
    );
}

#[tokio::test]
async fn latest_issued_policy_ignores_an_older_resolver() {
    let config = EngineConfig::default().with_concurrency(ConcurrencyPolicy::LatestIssuedWins);
    let (gateway, engine, id) = board_with_one_task(config).await;
    let first = gateway.hold_next(GatewayOp::Update);
    let second = gateway.hold_next(GatewayOp::Update);

    let engine_ref = &engine;
    let gateway_ref = &*gateway;
    let id_ref = &id;
    let (to_in_progress, to_done, ()) = tokio::join!(
        engine.move_task(&id, TaskStatus::InProgress),
        async {
            until(|| gateway_ref.call_count(GatewayOp::Update) == 1).await;
            engine_ref.move_task(id_ref, TaskStatus::Done).await
        },
        async move {
            until(|| gateway_ref.call_count(GatewayOp::Update) == 2).await;
            second.release();
            until(|| engine_ref.in_flight() == 1).await;
            first.release();
        }
    );

    assert_eq!(to_in_progress.unwrap(), Settled::Superseded);
    assert_eq!(to_done.unwrap(), Settled::Confirmed);
    assert_eq!(status_of(&engine, &id), Some(TaskStatus::Done));
}

#[tokio::test]
async fn latest_issued_policy_skips_rollback_of_a_stale_failure() {
    let config = EngineConfig::default().with_concurrency(ConcurrencyPolicy::LatestIssuedWins);
    let (gateway, engine, id) = board_with_one_task(config).await;
    let first = gateway.hold_next(GatewayOp::Update);

    let engine_ref = &engine;
    let gateway_ref = &*gateway;
    let id_ref = &id;
    let (stale, latest, ()) = tokio::join!(
        engine.move_task(&id, TaskStatus::InProgress),
        async {
            until(|| gateway_ref.call_count(GatewayOp::Update) == 1).await;
            engine_ref.move_task(id_ref, TaskStatus::Done).await
        },
        async move {
            until(|| engine_ref.in_flight() == 1 && gateway_ref.call_count(GatewayOp::Update) == 2)
                .await;
            first.fail(GatewayError::Unavailable("network error".to_string()));
        }
    );

    assert_eq!(latest.unwrap(), Settled::Confirmed);
    assert_eq!(
        stale.unwrap_err(),
        MutationError::Remote {
            error: GatewayError::Unavailable("network error".to_string()),
            recovery: Recovery::Skipped,
        }
    );
    assert_eq!(status_of(&engine, &id), Some(TaskStatus::Done));
    assert_eq!(gateway.call_count(GatewayOp::List), 1);
    assert_eq!(engine.notifications().len(), 1);
}

#[tokio::test]
async fn inverse_patch_policy_restores_status_without_refetch() {
    let config = EngineConfig::default()
        .with_policy(MutationKind::UpdateStatus, ReconcilePolicy::InversePatch);
    let (gateway, engine, id) = board_with_one_task(config).await;
    gateway.fail_next(
        GatewayOp::Update,
        GatewayError::Rejected("permission denied".to_string()),
    );

    let err = engine
        .move_task(&id, TaskStatus::InProgress)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MutationError::Remote {
            recovery: Recovery::InversePatch,
            ..
        }
    ));
    assert_eq!(status_of(&engine, &id), Some(TaskStatus::Todo));
    assert_eq!(gateway.call_count(GatewayOp::List), 1);
    assert_eq!(
        engine.notifications().snapshot()[0].message,
        "Failed to move task: permission denied"
    );
}

#[tokio::test]
async fn failed_refetch_falls_back_to_prior_status() {
    let (gateway, engine, id) = board_with_one_task(EngineConfig::default()).await;
    gateway.fail_next(
        GatewayOp::Update,
        GatewayError::Unavailable("network error".to_string()),
    );
    gateway.fail_next(
        GatewayOp::List,
        GatewayError::Unavailable("network error".to_string()),
    );

    let err = engine.move_task(&id, TaskStatus::Done).await.unwrap_err();

    assert!(matches!(
        err,
        MutationError::Remote {
            recovery: Recovery::RefetchFailed,
            ..
        }
    ));
    assert_eq!(status_of(&engine, &id), Some(TaskStatus::Todo));
}

#[tokio::test]
async fn drop_onto_current_column_issues_no_call() {
    let (gateway, engine, id) = board_with_one_task(EngineConfig::default()).await;
    let revision = engine.store().read(|store| store.revision());

    let settled = engine.move_task(&id, TaskStatus::Todo).await.unwrap();

    assert_eq!(settled, Settled::Unchanged);
    assert_eq!(gateway.call_count(GatewayOp::Update), 0);
    assert_eq!(engine.store().read(|store| store.revision()), revision);
}

#[tokio::test]
async fn board_tracks_project_progress_after_drops() {
    let gateway = Arc::new(MemoryGateway::new());
    let project = gateway.seed(Record::project(alice(), "Website Redesign", "Q1 refresh"));
    let project_id = project.id().cloned().unwrap();
    let mut ids = Vec::new();
    for title in ["Create login page", "Setup Supabase"] {
        let mut task = Record::task(alice(), title, TaskPriority::Medium);
        task.project_id = Some(project_id.clone());
        ids.push(gateway.seed(task).id().cloned().unwrap());
    }

    let engine = MutationEngine::with_config(
        Session::signed_in(alice()),
        gateway.clone(),
        EngineConfig::default(),
    );
    assert_eq!(engine.refresh_all().await.unwrap(), 3);

    engine.move_task(&ids[0], TaskStatus::Done).await.unwrap();

    let progress = engine
        .store()
        .read(|store| store.project_progress(&project_id));
    assert_eq!(progress.total, 2);
    assert_eq!(progress.done, 1);
    assert_eq!(progress.percent(), 50);
}
