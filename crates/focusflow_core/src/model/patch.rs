//! Partial record updates.
//!
//! A `RecordPatch` names the fields a mutation proposes to change. `None`
//! leaves a field untouched; nullable fields use a nested `Option` so a patch
//! can also clear them.

use super::record::{EntityKind, RecordId, RecordValidationError, TaskPriority, TaskStatus};
use chrono::NaiveDate;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub content: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub project_id: Option<Option<RecordId>>,
}

impl RecordPatch {
    /// Single-field status update, as issued by a board drop.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.project_id.is_none()
    }

    /// Names of the touched fields, for metadata-only logging.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.title.is_some() {
            names.push("title");
        }
        if self.content.is_some() {
            names.push("content");
        }
        if self.status.is_some() {
            names.push("status");
        }
        if self.priority.is_some() {
            names.push("priority");
        }
        if self.due_date.is_some() {
            names.push("due_date");
        }
        if self.project_id.is_some() {
            names.push("project_id");
        }
        names
    }

    /// Validates the patch against the collection it targets.
    pub fn validate_for(&self, kind: EntityKind) -> Result<(), RecordValidationError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(RecordValidationError::BlankTitle(kind));
            }
        }
        if kind != EntityKind::Task {
            let task_field = if self.status.is_some() {
                Some("status")
            } else if self.priority.is_some() {
                Some("priority")
            } else if self.project_id.is_some() {
                Some("project_id")
            } else {
                None
            };
            if let Some(field) = task_field {
                return Err(RecordValidationError::TaskFieldOnNonTask { kind, field });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patch_is_empty() {
        assert!(RecordPatch::default().is_empty());
        assert!(!RecordPatch::status(TaskStatus::Done).is_empty());
    }

    #[test]
    fn blank_title_patch_is_rejected() {
        let err = RecordPatch::title(" ")
            .validate_for(EntityKind::Project)
            .unwrap_err();
        assert_eq!(err, RecordValidationError::BlankTitle(EntityKind::Project));
    }

    #[test]
    fn status_patch_is_task_only() {
        assert!(RecordPatch::status(TaskStatus::Done)
            .validate_for(EntityKind::Task)
            .is_ok());
        assert!(RecordPatch::status(TaskStatus::Done)
            .validate_for(EntityKind::Note)
            .is_err());
    }

    #[test]
    fn field_names_lists_touched_fields_in_order() {
        let patch = RecordPatch {
            title: Some("Q1 Marketing Campaign".to_string()),
            due_date: Some(None),
            ..RecordPatch::default()
        };
        assert_eq!(patch.field_names(), vec!["title", "due_date"]);
    }
}
