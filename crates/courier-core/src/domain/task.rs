use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::audit::DecisionRecord;
use super::envelope::{Envelope, ExecutionMode};
use super::ids::TaskId;
use super::plan::Plan;
use super::reply::{Analysis, Classification, Verification};
use super::status::TaskStatus;
use super::submission::ValidSubmission;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque reference to an attached document (path, URL, blob key, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The unit of work and its envelope.
///
/// Design:
/// - The persisted record is this struct, rewritten in full on every transition.
/// - Only the scheduler mutates it; collaborators receive `&Task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub target_software: String,
    pub task_type: TaskType,

    #[serde(default)]
    pub documents: Vec<DocumentRef>,

    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,

    /// The revised plan from deep analysis has not been executed yet.
    #[serde(default)]
    pub plan_revised: bool,

    pub envelope: Envelope,

    /// Most recent collaborator failure, kept for the next ARCHITECT pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_analysis: Option<Analysis>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verification: Option<Verification>,

    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: TaskId,
        submission: ValidSubmission,
        mode: ExecutionMode,
        ttl_max: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            description: submission.description,
            target_software: submission.target_software,
            task_type: submission.task_type,
            documents: submission.documents,
            status: TaskStatus::Received,
            plan: None,
            plan_revised: false,
            envelope: Envelope::new(mode, ttl_max),
            last_error: None,
            classification: None,
            last_analysis: None,
            last_verification: None,
            decisions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.envelope.mode
    }

    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Append an audit entry stamped with the current hop.
    pub fn record_decision(
        &mut self,
        policy: &str,
        decision: &str,
        trigger: serde_json::Value,
        context: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        self.decisions.push(DecisionRecord::new(
            self.envelope.hops,
            trigger,
            policy,
            decision,
            context,
            now,
        ));
    }
}
