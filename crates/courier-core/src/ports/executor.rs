//! Executor port - ステップを実際に実行する外部コラボレータ
//!
//! - `run_direct`: コマンド実行（EXECUTE / SUPERVISE の EXECUTE ステップ）
//! - `run_supervised`: UI 操作（SUPERVISE ステップ。before/after の観測 artifact を返してよい）
//!
//! タイムアウトは実装側の責務。超過したら `CollaboratorError::Tooling` を返す。

use async_trait::async_trait;

use crate::domain::{CollaboratorError, PlanStep, StepOutcome, Task};

#[async_trait]
pub trait Executor: Send + Sync {
    async fn run_direct(
        &self,
        task: &Task,
        step: &PlanStep,
    ) -> Result<StepOutcome, CollaboratorError>;

    async fn run_supervised(
        &self,
        task: &Task,
        step: &PlanStep,
    ) -> Result<StepOutcome, CollaboratorError>;
}
