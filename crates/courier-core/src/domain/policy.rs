//! Escalation policy: thresholds that drive mode changes.

use serde::{Deserialize, Serialize};

/// Thresholds for failure-driven escalation and recovery-driven de-escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Consecutive failures that force ARCHITECT mode.
    pub escalate_after_failures: u32,

    /// Consecutive successes that return an escalated task to EXECUTE.
    pub de_escalate_after_successes: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            escalate_after_failures: 3,
            de_escalate_after_successes: 2,
        }
    }
}
