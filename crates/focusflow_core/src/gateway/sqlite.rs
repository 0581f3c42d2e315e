//! SQLite-backed collection gateway.
//!
//! # Responsibility
//! - Serve as a local stand-in for the hosted record collection.
//! - Keep SQL details behind the `CollectionGateway` contract.
//!
//! # Invariants
//! - Every statement filters by `owner_id` and `kind`.
//! - Deletes are soft; tombstoned rows never come back from `list`.
//! - Writes validate input before touching SQL; read paths reject rows that
//!   violate the record model instead of masking them.

use super::{CollectionGateway, GatewayError, GatewayResult};
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::model::patch::RecordPatch;
use crate::model::record::{
    EntityKind, Record, RecordId, RecordKey, TaskPriority, TaskStatus, UserId,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, error};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::path::Path;
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    kind,
    owner_id,
    title,
    content,
    status,
    priority,
    due_date,
    project_id
FROM records";

const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        open_db(path).map(Self::new)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        open_db_in_memory().map(Self::new)
    }
}

#[async_trait]
impl CollectionGateway for SqliteGateway {
    async fn create(&self, user: &UserId, draft: &Record) -> GatewayResult<Record> {
        draft
            .validate()
            .map_err(|err| GatewayError::Rejected(err.to_string()))?;

        let id = RecordId::new(Uuid::new_v4().to_string());
        let mut persisted = draft.clone().with_key(RecordKey::Remote(id.clone()));
        persisted.owner_id = user.clone();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO records (
                id,
                kind,
                owner_id,
                title,
                content,
                status,
                priority,
                due_date,
                project_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                id.as_str(),
                persisted.kind.as_str(),
                user.as_str(),
                persisted.title.as_str(),
                persisted.content.as_deref(),
                persisted.status.map(TaskStatus::as_str),
                persisted.priority.map(TaskPriority::as_str),
                persisted.due_date.map(format_due_date),
                persisted.project_id.as_ref().map(RecordId::as_str),
            ],
        )
        .map_err(map_sql_error)?;

        debug!(
            "event=gateway_create module=gateway.sqlite status=ok kind={}",
            persisted.kind
        );
        Ok(persisted)
    }

    async fn update(
        &self,
        user: &UserId,
        kind: EntityKind,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> GatewayResult<()> {
        patch
            .validate_for(kind)
            .map_err(|err| GatewayError::Rejected(err.to_string()))?;

        let mut assignments: Vec<&'static str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(title) = &patch.title {
            assignments.push("title = ?");
            bind_values.push(Value::Text(title.clone()));
        }
        if let Some(content) = &patch.content {
            assignments.push("content = ?");
            bind_values.push(optional_text(content.clone()));
        }
        if let Some(status) = patch.status {
            assignments.push("status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(priority) = patch.priority {
            assignments.push("priority = ?");
            bind_values.push(Value::Text(priority.as_str().to_string()));
        }
        if let Some(due_date) = patch.due_date {
            assignments.push("due_date = ?");
            bind_values.push(optional_text(due_date.map(format_due_date)));
        }
        if let Some(project_id) = &patch.project_id {
            assignments.push("project_id = ?");
            bind_values.push(optional_text(
                project_id.as_ref().map(|id| id.as_str().to_string()),
            ));
        }
        assignments.push("updated_at = (strftime('%s', 'now') * 1000)");

        let sql = format!(
            "UPDATE records SET {} WHERE id = ? AND kind = ? AND owner_id = ? AND is_deleted = 0;",
            assignments.join(", ")
        );
        bind_values.push(Value::Text(id.as_str().to_string()));
        bind_values.push(Value::Text(kind.as_str().to_string()));
        bind_values.push(Value::Text(user.as_str().to_string()));

        let conn = self.conn.lock();
        let changed = conn
            .execute(&sql, params_from_iter(bind_values))
            .map_err(map_sql_error)?;
        if changed == 0 {
            return Err(GatewayError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn delete(&self, user: &UserId, kind: EntityKind, id: &RecordId) -> GatewayResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE records
                 SET
                    is_deleted = 1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1 AND kind = ?2 AND owner_id = ?3 AND is_deleted = 0;",
                params![id.as_str(), kind.as_str(), user.as_str()],
            )
            .map_err(map_sql_error)?;
        if changed == 0 {
            return Err(GatewayError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn list(&self, user: &UserId, kind: EntityKind) -> GatewayResult<Vec<Record>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{RECORD_SELECT_SQL}
             WHERE owner_id = ?1 AND kind = ?2 AND is_deleted = 0
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![user.as_str(), kind.as_str()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }
}

fn parse_record_row(row: &Row<'_>) -> GatewayResult<Record> {
    let kind_text: String = row.get("kind")?;
    let kind = EntityKind::parse(&kind_text).ok_or_else(|| {
        GatewayError::InvalidData(format!("invalid kind `{kind_text}` in records.kind"))
    })?;

    let status = match row.get::<_, Option<String>>("status")? {
        Some(value) => Some(TaskStatus::parse(&value).ok_or_else(|| {
            GatewayError::InvalidData(format!("invalid status `{value}` in records.status"))
        })?),
        None => None,
    };

    let priority = match row.get::<_, Option<String>>("priority")? {
        Some(value) => Some(TaskPriority::parse(&value).ok_or_else(|| {
            GatewayError::InvalidData(format!("invalid priority `{value}` in records.priority"))
        })?),
        None => None,
    };

    let due_date = match row.get::<_, Option<String>>("due_date")? {
        Some(value) => Some(NaiveDate::parse_from_str(&value, DUE_DATE_FORMAT).map_err(|_| {
            GatewayError::InvalidData(format!("invalid date `{value}` in records.due_date"))
        })?),
        None => None,
    };

    let record = Record {
        key: RecordKey::Remote(RecordId::new(row.get::<_, String>("id")?)),
        kind,
        owner_id: UserId::new(row.get::<_, String>("owner_id")?),
        title: row.get("title")?,
        content: row.get("content")?,
        status,
        priority,
        due_date,
        project_id: row
            .get::<_, Option<String>>("project_id")?
            .map(RecordId::new),
    };
    record
        .validate()
        .map_err(|err| GatewayError::InvalidData(err.to_string()))?;
    Ok(record)
}

fn format_due_date(date: NaiveDate) -> String {
    date.format(DUE_DATE_FORMAT).to_string()
}

fn optional_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

fn map_sql_error(err: rusqlite::Error) -> GatewayError {
    if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        return GatewayError::Rejected(format!("constraint violation: {err}"));
    }
    error!(
        "event=gateway_sql module=gateway.sqlite status=error error={}",
        err
    );
    GatewayError::Unavailable(err.to_string())
}
