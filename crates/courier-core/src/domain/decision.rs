//! Decision model: next transition for a task after a pass.
//!
//! This module defines the Decision type (what to do next) and the Decider trait
//! (how to determine it from the envelope and the signal the pass produced).

use std::fmt;

use super::envelope::Envelope;
use super::policy::EscalationPolicy;
use super::reply::{Verdict, Verification};

/// What a pass produced, reduced to what the state machine cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Pass,
    Retry { reason: String },
    /// Verifier asked for human judgment.
    Escalate { reason: String },
    /// A collaborator call failed or returned malformed data.
    Failure { error: String },
}

impl Signal {
    pub fn from_verification(verification: &Verification) -> Self {
        match verification.status {
            Verdict::Pass => Signal::Pass,
            Verdict::Retry => Signal::Retry {
                reason: verification.reason.clone(),
            },
            Verdict::Escalate => Signal::Escalate {
                reason: verification.reason.clone(),
            },
        }
    }

    /// RETRY verdicts and collaborator failures share the same counter path.
    pub fn is_failure_class(&self) -> bool {
        matches!(self, Signal::Retry { .. } | Signal::Failure { .. })
    }

    /// Apply the signal to the streak counters.
    pub fn update_counters(&self, envelope: &mut Envelope) {
        match self {
            Signal::Pass => envelope.record_success(),
            Signal::Retry { .. } | Signal::Failure { .. } => envelope.record_failure(),
            Signal::Escalate { .. } => {}
        }
    }
}

/// The next transition for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Terminal success; optionally reverse an earlier escalation.
    Complete { de_escalate: bool },

    /// Re-enqueue at the tail; optionally force ARCHITECT first.
    Retry { escalate: bool, reason: String },

    /// TTL exhausted. Terminal.
    DeadLetter { reason: String },

    /// Hand off to a human. Terminal.
    NeedsHuman { reason: String },
}

impl Decision {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::Retry { .. })
    }

    /// Stable name used in audit records.
    pub fn name(&self) -> &'static str {
        match self {
            Decision::Complete { de_escalate: false } => "complete",
            Decision::Complete { de_escalate: true } => "complete_and_de_escalate",
            Decision::Retry { escalate: false, .. } => "retry",
            Decision::Retry { escalate: true, .. } => "escalate",
            Decision::DeadLetter { .. } => "dead_letter",
            Decision::NeedsHuman { .. } => "needs_human",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trait for deciding the next transition.
///
/// Deciders are pure functions: the envelope passed in already reflects the
/// signal's counter update (see [`Signal::update_counters`]); the decider only
/// reads it. Applying the decision is the scheduler's job.
pub trait Decider: Send + Sync {
    fn decide(&self, envelope: &Envelope, signal: &Signal) -> Decision;
}

/// Threshold-based decider:
/// - PASS completes; de-escalates after a recovery streak while escalated
/// - RETRY / failure dead-letters once TTL is spent (TTL wins over escalation)
/// - otherwise retries, escalating after a failure streak while not escalated
/// - ESCALATE hands off to a human
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    policy: EscalationPolicy,
}

impl DefaultDecider {
    pub fn new(policy: EscalationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, envelope: &Envelope, signal: &Signal) -> Decision {
        match signal {
            Signal::Pass => Decision::Complete {
                de_escalate: envelope.escalated
                    && envelope.consecutive_successes >= self.policy.de_escalate_after_successes,
            },
            Signal::Escalate { reason } => Decision::NeedsHuman {
                reason: reason.clone(),
            },
            Signal::Retry { reason } | Signal::Failure { error: reason } => {
                if envelope.ttl_exhausted() {
                    Decision::DeadLetter {
                        reason: format!(
                            "TTL exhausted: {}/{} hops ({reason})",
                            envelope.hops, envelope.ttl_max
                        ),
                    }
                } else {
                    Decision::Retry {
                        escalate: !envelope.escalated
                            && envelope.consecutive_failures
                                >= self.policy.escalate_after_failures,
                        reason: reason.clone(),
                    }
                }
            }
        }
    }
}
