//! TaskStore port - タスクレコードの永続化
//!
//! - 1 タスク = 1 レコード。遷移のたびに全体を書き直す（差分パッチはしない）
//! - dead-letter は別ストアに一度だけ書く（更新しない）
//! - 失敗しても scheduler は止めない（呼び出し側でログに残す）

use async_trait::async_trait;

use crate::domain::{StoreError, Task, TaskId};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Rewrite the full record for `task.id`.
    async fn save(&self, task: &Task) -> Result<(), StoreError>;

    async fn load(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// All persisted task records, in no particular order.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;

    /// Write the dead-letter record. Fails with `AlreadyDeadLettered` on a second write.
    async fn dead_letter(&self, task: &Task) -> Result<(), StoreError>;

    async fn dead_letters(&self) -> Result<Vec<Task>, StoreError>;
}
