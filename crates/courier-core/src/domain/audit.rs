//! Decision audit log attached to each task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decision made by the scheduler for a task.
///
/// Records:
/// - What observation triggered this decision
/// - What policy was applied
/// - What was decided (retry, escalate, dead-letter, ...)
///
/// This enables "why did the system do X" explanations from the persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Hop count at the time of the decision.
    pub hop: u32,

    /// What was observed that triggered this decision.
    pub trigger: serde_json::Value,

    /// Examples: "verification", "escalation_policy", "ttl", "deep_analysis"
    pub policy: String,

    /// Examples: "complete", "retry", "escalate", "dead_letter", "revise_plan"
    pub decision: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,

    pub decided_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(
        hop: u32,
        trigger: serde_json::Value,
        policy: impl Into<String>,
        decision: impl Into<String>,
        context: Option<serde_json::Value>,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hop,
            trigger,
            policy: policy.into(),
            decision: decision.into(),
            context,
            decided_at,
        }
    }
}
