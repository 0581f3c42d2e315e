use focusflow_core::{
    CollectionGateway, EngineConfig, EntityKind, GatewayError, MutationEngine, MutationError,
    Record, RecordId, RecordPatch, Recovery, Session, SqliteGateway, TaskPriority, TaskStatus,
    UserId,
};
use std::sync::Arc;

fn alice() -> UserId {
    UserId::new("alice")
}

#[tokio::test]
async fn board_changes_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focusflow.db");

    let task_id = {
        let gateway = Arc::new(SqliteGateway::open(&path).unwrap());
        let engine = MutationEngine::with_config(
            Session::signed_in(alice()),
            gateway,
            EngineConfig::default(),
        );
        let task = engine
            .create_task("Create login page", TaskPriority::Medium)
            .await
            .unwrap();
        let id = task.id().cloned().unwrap();
        engine.move_task(&id, TaskStatus::Done).await.unwrap();
        engine
            .create_note("Meeting Notes", "Discuss Q1 goals")
            .await
            .unwrap();
        id
    };

    let gateway = Arc::new(SqliteGateway::open(&path).unwrap());
    let engine =
        MutationEngine::with_config(Session::signed_in(alice()), gateway, EngineConfig::default());
    assert_eq!(engine.refresh_all().await.unwrap(), 2);

    let task = engine.store().task(&task_id).unwrap();
    assert_eq!(task.status, Some(TaskStatus::Done));
    assert_eq!(task.title, "Create login page");
}

#[tokio::test]
async fn deleted_rows_are_hidden_and_cannot_be_updated() {
    let gateway = SqliteGateway::open_in_memory().unwrap();
    let note = gateway
        .create(&alice(), &Record::note(alice(), "Grocery List", "- Milk"))
        .await
        .unwrap();
    let id = note.id().cloned().unwrap();

    gateway.delete(&alice(), EntityKind::Note, &id).await.unwrap();

    assert!(gateway
        .list(&alice(), EntityKind::Note)
        .await
        .unwrap()
        .is_empty());
    let err = gateway
        .update(&alice(), EntityKind::Note, &id, &RecordPatch::title("Shopping"))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::NotFound(id.clone()));
    let err = gateway
        .delete(&alice(), EntityKind::Note, &id)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::NotFound(id));
}

#[tokio::test]
async fn rows_are_scoped_by_owner_and_kind() {
    let gateway = SqliteGateway::open_in_memory().unwrap();
    let bob = UserId::new("bob");
    let theirs = gateway
        .create(&bob, &Record::task(bob.clone(), "Bob's task", TaskPriority::Low))
        .await
        .unwrap();
    gateway
        .create(&alice(), &Record::project(alice(), "Website Redesign", "Q1"))
        .await
        .unwrap();

    assert!(gateway
        .list(&alice(), EntityKind::Task)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(gateway.list(&alice(), EntityKind::Project).await.unwrap().len(), 1);

    let err = gateway
        .update(
            &alice(),
            EntityKind::Task,
            theirs.id().unwrap(),
            &RecordPatch::status(TaskStatus::Done),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
}

#[tokio::test]
async fn partial_update_touches_only_named_fields() {
    let gateway = SqliteGateway::open_in_memory().unwrap();
    let mut draft = Record::task(alice(), "Setup Supabase", TaskPriority::High);
    draft.content = Some("auth + storage".to_string());
    let created = gateway.create(&alice(), &draft).await.unwrap();
    let id = created.id().cloned().unwrap();

    let patch = RecordPatch {
        status: Some(TaskStatus::InProgress),
        content: Some(None),
        ..RecordPatch::default()
    };
    gateway
        .update(&alice(), EntityKind::Task, &id, &patch)
        .await
        .unwrap();

    let listed = gateway.list(&alice(), EntityKind::Task).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, Some(TaskStatus::InProgress));
    assert_eq!(listed[0].priority, Some(TaskPriority::High));
    assert_eq!(listed[0].title, "Setup Supabase");
    assert_eq!(listed[0].content, None);
}

#[tokio::test]
async fn rejected_update_is_rolled_back_by_the_engine() {
    let gateway = Arc::new(SqliteGateway::open_in_memory().unwrap());
    let engine = MutationEngine::with_config(
        Session::signed_in(alice()),
        gateway.clone(),
        EngineConfig::default(),
    );
    let task = engine
        .create_task("Research competitors", TaskPriority::Low)
        .await
        .unwrap();
    let id = task.id().cloned().unwrap();

    let patch = RecordPatch {
        project_id: Some(Some(RecordId::new("missing-project"))),
        ..RecordPatch::default()
    };
    let err = engine
        .update_fields(EntityKind::Task, &id, patch)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MutationError::Remote {
            error: GatewayError::Rejected(_),
            recovery: Recovery::InversePatch,
        }
    ));
    assert_eq!(engine.store().task(&id).unwrap().project_id, None);
}
