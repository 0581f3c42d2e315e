//! Record domain model.
//!
//! # Responsibility
//! - Define the canonical record shared by the task, note and project views.
//! - Provide local validation used before any mutation reaches the network.
//!
//! # Invariants
//! - A record is addressed by a `RecordKey`; the opaque remote id is absent
//!   until the first successful create.
//! - `status` and `priority` are set for tasks and unset for every other kind.
//! - `title` is never blank for a record that passed `validate()`.

use super::patch::RecordPatch;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identity of the signed-in user, supplied by the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier assigned by the remote collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Store key of a record.
///
/// Optimistically created records live under `Pending` until the remote
/// create answers with a server id, then they are re-keyed to `Remote`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "value")]
pub enum RecordKey {
    Pending(Uuid),
    Remote(RecordId),
}

impl RecordKey {
    /// Allocates a fresh client-side key.
    pub fn pending() -> Self {
        Self::Pending(Uuid::new_v4())
    }

    pub fn remote_id(&self) -> Option<&RecordId> {
        match self {
            Self::Pending(_) => None,
            Self::Remote(id) => Some(id),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl From<RecordId> for RecordKey {
    fn from(value: RecordId) -> Self {
        Self::Remote(value)
    }
}

impl From<&RecordId> for RecordKey {
    fn from(value: &RecordId) -> Self {
        Self::Remote(value.clone())
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending(uuid) => write!(f, "pending:{uuid}"),
            Self::Remote(id) => write!(f, "{id}"),
        }
    }
}

/// Entity type of a record; one collection exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Note,
    Project,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Task, EntityKind::Note, EntityKind::Project];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Note => "note",
            Self::Project => "project",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task" => Some(Self::Task),
            "note" => Some(Self::Note),
            "project" => Some(Self::Project),
            _ => None,
        }
    }

    /// Capitalized label used in user-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Task => "Task",
            Self::Note => "Note",
            Self::Project => "Project",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Board column a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "todo")]
    Todo,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "done")]
    Done,
}

impl TaskStatus {
    /// Column order on the board.
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(Self::Todo),
            "in-progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn column_title(self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Canonical domain record for task, note and project data.
///
/// Task-specific fields stay optional so one shape serves every collection,
/// the same way every view reads from one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: RecordKey,
    pub kind: EntityKind,
    pub owner_id: UserId,
    pub title: String,
    /// Note body or project description.
    pub content: Option<String>,
    /// Meaningful only when `kind == EntityKind::Task`.
    pub status: Option<TaskStatus>,
    /// Meaningful only when `kind == EntityKind::Task`.
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    /// Project a task is filed under, if any.
    pub project_id: Option<RecordId>,
}

impl Record {
    /// Creates an unpersisted record of `kind` under a fresh pending key.
    ///
    /// Tasks start in `todo` with `medium` priority.
    pub fn draft(kind: EntityKind, owner_id: UserId, title: impl Into<String>) -> Self {
        let (status, priority) = match kind {
            EntityKind::Task => (Some(TaskStatus::Todo), Some(TaskPriority::Medium)),
            EntityKind::Note | EntityKind::Project => (None, None),
        };
        Self {
            key: RecordKey::pending(),
            kind,
            owner_id,
            title: title.into(),
            content: None,
            status,
            priority,
            due_date: None,
            project_id: None,
        }
    }

    pub fn task(owner_id: UserId, title: impl Into<String>, priority: TaskPriority) -> Self {
        let mut record = Self::draft(EntityKind::Task, owner_id, title);
        record.priority = Some(priority);
        record
    }

    pub fn note(owner_id: UserId, title: impl Into<String>, content: impl Into<String>) -> Self {
        let mut record = Self::draft(EntityKind::Note, owner_id, title);
        record.content = Some(content.into());
        record
    }

    pub fn project(
        owner_id: UserId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut record = Self::draft(EntityKind::Project, owner_id, name);
        record.content = Some(description.into());
        record
    }

    /// Re-keys this record, typically with the server-assigned id.
    pub fn with_key(mut self, key: RecordKey) -> Self {
        self.key = key;
        self
    }

    /// Server id, absent until first persisted.
    pub fn id(&self) -> Option<&RecordId> {
        self.key.remote_id()
    }

    pub fn is_persisted(&self) -> bool {
        !self.key.is_pending()
    }

    /// Validates local invariants before a record is inserted or sent.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.title.trim().is_empty() {
            return Err(RecordValidationError::BlankTitle(self.kind));
        }
        match self.kind {
            EntityKind::Task => {
                if self.status.is_none() {
                    return Err(RecordValidationError::MissingStatus);
                }
                if self.priority.is_none() {
                    return Err(RecordValidationError::MissingPriority);
                }
            }
            EntityKind::Note | EntityKind::Project => {
                if self.status.is_some() {
                    return Err(RecordValidationError::TaskFieldOnNonTask {
                        kind: self.kind,
                        field: "status",
                    });
                }
                if self.priority.is_some() {
                    return Err(RecordValidationError::TaskFieldOnNonTask {
                        kind: self.kind,
                        field: "priority",
                    });
                }
                if self.project_id.is_some() {
                    return Err(RecordValidationError::TaskFieldOnNonTask {
                        kind: self.kind,
                        field: "project_id",
                    });
                }
            }
        }
        Ok(())
    }

    /// Merges `patch` into this record and returns the inverse patch.
    ///
    /// The inverse carries the prior value of exactly the fields `patch`
    /// touched, so applying it restores the pre-patch state.
    pub fn apply_patch(&mut self, patch: &RecordPatch) -> RecordPatch {
        let mut inverse = RecordPatch::default();
        if let Some(title) = &patch.title {
            inverse.title = Some(std::mem::replace(&mut self.title, title.clone()));
        }
        if let Some(content) = &patch.content {
            inverse.content = Some(std::mem::replace(&mut self.content, content.clone()));
        }
        if let Some(status) = patch.status {
            inverse.status = self.status.replace(status);
        }
        if let Some(priority) = patch.priority {
            inverse.priority = self.priority.replace(priority);
        }
        if let Some(due_date) = patch.due_date {
            inverse.due_date = Some(std::mem::replace(&mut self.due_date, due_date));
        }
        if let Some(project_id) = &patch.project_id {
            inverse.project_id = Some(std::mem::replace(&mut self.project_id, project_id.clone()));
        }
        inverse
    }

    /// Returns the subset of `patch` that would actually change this record.
    pub fn changes_from(&self, patch: &RecordPatch) -> RecordPatch {
        RecordPatch {
            title: patch.title.clone().filter(|title| *title != self.title),
            content: patch.content.clone().filter(|content| *content != self.content),
            status: patch.status.filter(|status| Some(*status) != self.status),
            priority: patch.priority.filter(|priority| Some(*priority) != self.priority),
            due_date: patch.due_date.filter(|due_date| *due_date != self.due_date),
            project_id: patch
                .project_id
                .clone()
                .filter(|project_id| *project_id != self.project_id),
        }
    }
}

/// Local validation failure; never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    BlankTitle(EntityKind),
    MissingStatus,
    MissingPriority,
    TaskFieldOnNonTask {
        kind: EntityKind,
        field: &'static str,
    },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle(kind) => write!(f, "{} title is required", kind.label()),
            Self::MissingStatus => write!(f, "task status is required"),
            Self::MissingPriority => write!(f, "task priority is required"),
            Self::TaskFieldOnNonTask { kind, field } => {
                write!(f, "`{field}` only applies to tasks, not to a {kind}")
            }
        }
    }
}

impl Error for RecordValidationError {}
