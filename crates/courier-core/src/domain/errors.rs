//! Errors - エラー型と分類
//!
//! - `CollaboratorError`: Planner / Executor 呼び出しの失敗。scheduler 内で RETRY 相当に変換され、外へは伝播しない
//! - `StoreError`: 永続化の失敗。ログに残すだけで scheduling loop は止めない
//! - `CourierError`: 呼び出し側（submit / status / 起動時の設定・構築）へ返すエラー

use thiserror::Error;

use super::ids::TaskId;
use super::status::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Network / RPC failure reaching the collaborator.
    #[error("transport error: {0}")]
    Transport(String),

    /// The collaborator ran but its tooling failed (process crash, timeout, ...).
    #[error("tooling error: {0}")]
    Tooling(String),

    /// Structured data was expected but not received.
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("task {0} is already dead-lettered")]
    AlreadyDeadLettered(TaskId),
}

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("invalid submission: {0}")]
    Validation(String),

    #[error("task {0} is already {1}")]
    AlreadyTerminal(TaskId, TaskStatus),

    #[error("task {0} is already queued")]
    AlreadyQueued(TaskId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Build(#[from] crate::app::BuildError),
}
