//! Task lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
///
/// State transitions:
/// - Received -> Classifying -> Planned -> Executing -> Verifying -> Completed
/// - Verifying -> Retrying -> Classifying (loop until TTL)
/// - Verifying -> NeedsHuman
/// - any non-terminal -> DeadLettered (TTL exhausted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Submitted, not yet picked up.
    Received,

    /// Planner is classifying intent.
    Classifying,

    /// A plan is attached to the task.
    Planned,

    /// Executor (or deep analysis) is running.
    Executing,

    /// Planner is judging the execution report.
    Verifying,

    /// Waiting in the pending queue for the next hop.
    Retrying,

    /// Verified PASS.
    Completed,

    /// Handed off for human judgment.
    NeedsHuman,

    /// TTL exhausted without success.
    DeadLettered,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::NeedsHuman | TaskStatus::DeadLettered
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Received => "received",
            TaskStatus::Classifying => "classifying",
            TaskStatus::Planned => "planned",
            TaskStatus::Executing => "executing",
            TaskStatus::Verifying => "verifying",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Completed => "completed",
            TaskStatus::NeedsHuman => "needs-human",
            TaskStatus::DeadLettered => "dead-lettered",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
