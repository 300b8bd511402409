//! Queue module: admission control over pending / processing / finished sets.

mod work_queue;

pub use work_queue::WorkQueue;

use thiserror::Error;

use crate::domain::{TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("task {0} is not being processed")]
    NotProcessing(TaskId),

    #[error("task {0} already finished as {1}")]
    Finished(TaskId, TaskStatus),

    #[error("task {0} cannot finish with non-terminal status {1}")]
    NotTerminal(TaskId, TaskStatus),
}
