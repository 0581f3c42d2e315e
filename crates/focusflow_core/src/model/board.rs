//! Kanban board projection over the task collection.
//!
//! # Invariants
//! - Every task with a status appears in exactly one column.
//! - Columns are always present in `TaskStatus::ALL` order, even when empty.

use super::record::{Record, RecordKey, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardColumn {
    pub status: TaskStatus,
    pub title: &'static str,
    pub tasks: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub columns: Vec<BoardColumn>,
}

impl Board {
    /// Groups tasks by status, preserving the iteration order of `tasks`.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut columns: Vec<BoardColumn> = TaskStatus::ALL
            .iter()
            .map(|status| BoardColumn {
                status: *status,
                title: status.column_title(),
                tasks: Vec::new(),
            })
            .collect();

        for task in tasks {
            let Some(status) = task.status else {
                continue;
            };
            if let Some(column) = columns.iter_mut().find(|column| column.status == status) {
                column.tasks.push(task.clone());
            }
        }

        Self { columns }
    }

    pub fn column(&self, status: TaskStatus) -> Option<&BoardColumn> {
        self.columns.iter().find(|column| column.status == status)
    }

    /// Column currently holding the task under `key`.
    pub fn locate(&self, key: &RecordKey) -> Option<TaskStatus> {
        self.columns
            .iter()
            .find(|column| column.tasks.iter().any(|task| &task.key == key))
            .map(|column| column.status)
    }

    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|column| column.tasks.len()).sum()
    }
}

/// Completion summary for one project's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectProgress {
    pub total: usize,
    pub done: usize,
}

impl ProjectProgress {
    /// Whole percent of done tasks; an empty project reports 0.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.done * 100) / self.total) as u8
    }
}
