//! Status views for operators and the CLI.

use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionMode, Task, TaskId, TaskStatus};

/// Snapshot of the scheduler's three sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub needs_human: usize,
    pub dead_lettered: usize,
}

impl QueueCounts {
    pub fn finished(&self) -> usize {
        self.completed + self.needs_human + self.dead_lettered
    }
}

/// One-line view of a task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub status: TaskStatus,
    pub mode: ExecutionMode,
    pub hops: u32,
    pub ttl_max: u32,
    pub escalated: bool,
    pub description: String,
    pub last_error: Option<String>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            status: task.status,
            mode: task.envelope.mode,
            hops: task.envelope.hops,
            ttl_max: task.envelope.ttl_max,
            escalated: task.envelope.escalated,
            description: task.description.clone(),
            last_error: task.last_error.clone(),
        }
    }
}
