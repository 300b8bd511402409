//! Planner port - 分類・計画・深層分析・検証を行う外部コラボレータ
//!
//! 実装は通常 LLM などを背後に持つ。戻り値は `domain::reply` の型付き variant で、
//! 生の応答を持つ実装は `parse_reply` で境界検証してから返すこと。

use async_trait::async_trait;

use crate::domain::{
    Analysis, Classification, CollaboratorError, ExecutionReport, Plan, Task, Verification,
};

/// Planner/Classifier collaborator.
///
/// Every call may fail or come back malformed; the scheduler converts both into
/// a RETRY-class signal, so implementations should return errors rather than
/// inventing defaults for required data.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Classify a free-text message or task description.
    async fn classify(&self, message: &str) -> Result<Classification, CollaboratorError>;

    /// Decompose a task into ordered steps.
    async fn plan(&self, task: &Task) -> Result<Plan, CollaboratorError>;

    /// Root-cause analysis for an escalated task. `task.last_error`,
    /// `task.envelope.state_hashes` and the decision log are the inputs.
    async fn deep_analyze(&self, task: &Task) -> Result<Analysis, CollaboratorError>;

    /// Judge the outcome of one hop.
    async fn verify(
        &self,
        task: &Task,
        report: &ExecutionReport,
    ) -> Result<Verification, CollaboratorError>;
}
