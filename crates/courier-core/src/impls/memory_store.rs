//! MemoryTaskStore - テスト・一時実行用のストア
//!
//! - HashMap<TaskId, Task> を RwLock で保護
//! - dead-letter は別 map。二度目の書き込みは `AlreadyDeadLettered`

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{StoreError, Task, TaskId};
use crate::ports::TaskStore;

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    dead_letters: RwLock<HashMap<TaskId, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn load(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn dead_letter(&self, task: &Task) -> Result<(), StoreError> {
        match self.dead_letters.write().await.entry(task.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyDeadLettered(task.id)),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                Ok(())
            }
        }
    }

    async fn dead_letters(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.dead_letters.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionMode, NewTask, TaskStatus};
    use chrono::Utc;
    use ulid::Ulid;

    fn task(description: &str) -> Task {
        let submission = NewTask::new(description).validate().unwrap();
        Task::new(
            TaskId::from_ulid(Ulid::new()),
            submission,
            ExecutionMode::Execute,
            10,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_overwrites_full_record() {
        let store = MemoryTaskStore::new();
        let mut t = task("export ledger");
        store.save(&t).await.unwrap();

        t.set_status(TaskStatus::Planned, Utc::now());
        store.save(&t).await.unwrap();

        let loaded = store.load(t.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Planned);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_unknown_is_none() {
        let store = MemoryTaskStore::new();
        let id = TaskId::from_ulid(Ulid::new());
        assert!(store.load(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dead_letter_is_write_once() {
        let store = MemoryTaskStore::new();
        let t = task("close period");

        store.dead_letter(&t).await.unwrap();
        let err = store.dead_letter(&t).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyDeadLettered(id) if id == t.id));
        assert_eq!(store.dead_letters().await.unwrap().len(), 1);
    }
}
