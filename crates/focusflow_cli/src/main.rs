//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire `focusflow_core` against the SQLite gateway and run one board drop.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Environment: `FOCUSFLOW_LOG_LEVEL`, `FOCUSFLOW_DB_PATH` (in-memory when
//! unset) and every `FOCUSFLOW_*` engine variable.

use focusflow_core::{
    core_version, default_log_level, init_stderr_logging, Board, EngineConfig, MutationEngine,
    Session, SqliteGateway, TaskPriority, TaskStatus, TimeoutGateway, UserId,
};
use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;

const ENV_LOG_LEVEL: &str = "FOCUSFLOW_LOG_LEVEL";
const ENV_DB_PATH: &str = "FOCUSFLOW_DB_PATH";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| default_log_level().to_string());
    if let Err(err) = init_stderr_logging(&level) {
        eprintln!("focusflow: {err}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={}", err);
            eprintln!("focusflow: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env()?;
    let sqlite = match std::env::var(ENV_DB_PATH) {
        Ok(path) => SqliteGateway::open(path)?,
        Err(_) => SqliteGateway::open_in_memory()?,
    };
    let gateway = Arc::new(TimeoutGateway::new(sqlite, config.remote_timeout));
    let engine =
        MutationEngine::with_config(Session::signed_in(UserId::new("demo")), gateway, config);
    info!(
        "event=cli_start module=cli status=ok version={}",
        core_version()
    );

    engine.refresh_all().await?;
    if engine.store().tasks().is_empty() {
        engine
            .create_task("Design system draft", TaskPriority::High)
            .await?;
        engine
            .create_task("Research competitors", TaskPriority::Medium)
            .await?;
    }

    let first = engine.store().tasks().into_iter().next();
    if let Some(id) = first.as_ref().and_then(|task| task.id().cloned()) {
        engine.move_task(&id, TaskStatus::InProgress).await?;
    }

    println!("focusflow_core version={}", core_version());
    print_board(&engine.board());
    for notification in engine.notifications().snapshot() {
        println!(
            "[{}] {}",
            notification.severity.as_str(),
            notification.message
        );
    }
    Ok(())
}

fn print_board(board: &Board) {
    for column in &board.columns {
        println!("{} ({})", column.title, column.tasks.len());
        for task in &column.tasks {
            println!("  - {} [{}]", task.title, task.key);
        }
    }
}
