//! TaskService - 呼び出し側に見せる窓口
//!
//! submit / status / list / handle_message / dead_letters をまとめる。
//! 状態遷移は scheduler に任せ、ここでは Task の生成と読み出しだけを行う。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::scheduler::Scheduler;
use crate::domain::{CourierError, ExecutionMode, NewTask, Task, TaskId, TaskStatus};
use crate::ports::{Clock, IdGenerator, Planner};

const FALLBACK_ANSWER: &str = "Understood.";

/// Result of [`TaskService::handle_message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageReply {
    /// Answered directly; no task was created.
    Answer { text: String },
    Queued { task_id: TaskId },
}

#[derive(Clone)]
pub struct TaskService {
    scheduler: Scheduler,
    planner: Arc<dyn Planner>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    ttl_max: u32,
}

impl TaskService {
    pub(crate) fn new(
        scheduler: Scheduler,
        planner: Arc<dyn Planner>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        ttl_max: u32,
    ) -> Self {
        Self {
            scheduler,
            planner,
            ids,
            clock,
            ttl_max,
        }
    }

    /// Create a task and append it to the pending queue.
    pub async fn submit(&self, new_task: NewTask) -> Result<(TaskId, TaskStatus), CourierError> {
        self.create(new_task, ExecutionMode::Execute).await
    }

    async fn create(
        &self,
        new_task: NewTask,
        mode: ExecutionMode,
    ) -> Result<(TaskId, TaskStatus), CourierError> {
        let submission = new_task.validate()?;
        let task = Task::new(
            self.ids.generate_task_id(),
            submission,
            mode,
            self.ttl_max,
            self.clock.now(),
        );
        let status = task.status;
        let task_id = self.scheduler.enqueue(task).await?;
        info!(%task_id, %mode, "task submitted");
        Ok((task_id, status))
    }

    /// Full record, envelope included.
    pub async fn status(&self, task_id: TaskId) -> Result<Task, CourierError> {
        if let Some(task) = self.scheduler.get(task_id).await {
            return Ok(task);
        }
        self.scheduler
            .store()
            .load(task_id)
            .await?
            .ok_or(CourierError::NotFound(task_id))
    }

    /// Every known task, most recent first.
    pub async fn list(&self) -> Result<Vec<Task>, CourierError> {
        let mut by_id: HashMap<TaskId, Task> = self
            .scheduler
            .store()
            .list()
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        // The registry is at least as fresh as the store.
        for task in self.scheduler.tasks().await {
            by_id.insert(task.id, task);
        }
        Ok(most_recent_first(by_id.into_values().collect()))
    }

    /// Answer simple messages directly; turn everything else into a task.
    ///
    /// A failed classification still queues the message, in EXECUTE mode.
    pub async fn handle_message(&self, text: &str) -> Result<MessageReply, CourierError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CourierError::Validation("message must not be blank".to_string()));
        }

        let (new_task, mode) = match self.planner.classify(text).await {
            Ok(classification) if classification.is_simple() => {
                let text = classification
                    .answer
                    .unwrap_or_else(|| FALLBACK_ANSWER.to_string());
                return Ok(MessageReply::Answer { text });
            }
            Ok(classification) => {
                let mut new_task = NewTask::new(text).with_type(classification.task_type);
                if let Some(software) = classification.software {
                    new_task = new_task.for_software(software);
                }
                (new_task, classification.mode)
            }
            Err(err) => {
                warn!(error = %err, "classification failed; queueing message as a task");
                (NewTask::new(text), ExecutionMode::Execute)
            }
        };

        let (task_id, _) = self.create(new_task, mode).await?;
        Ok(MessageReply::Queued { task_id })
    }

    /// Tasks that exhausted their hops, most recent first.
    pub async fn dead_letters(&self) -> Result<Vec<Task>, CourierError> {
        let letters = self.scheduler.store().dead_letters().await?;
        Ok(most_recent_first(letters))
    }
}

fn most_recent_first(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    tasks
}
