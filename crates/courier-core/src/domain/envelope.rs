//! Envelope: the per-task control state of the lifecycle state machine.
//!
//! The envelope is owned by exactly one task and holds everything the
//! scheduler consults to decide between retry, escalation and termination.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::SessionId;

/// Execution strategy currently applied to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Direct command execution; interactive steps are skipped.
    #[serde(alias = "execute")]
    Execute,

    /// Interactive execution with observation artifacts.
    #[serde(alias = "supervise")]
    Supervise,

    /// Deep analysis by the planner; the executor is bypassed.
    #[serde(alias = "architect")]
    Architect,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionMode::Execute => "EXECUTE",
            ExecutionMode::Supervise => "SUPERVISE",
            ExecutionMode::Architect => "ARCHITECT",
        };
        f.write_str(s)
    }
}

/// Returned by [`Envelope::begin_hop`] when the hop budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ttl exhausted: {hops}/{ttl_max} hops used")]
pub struct TtlExhausted {
    pub hops: u32,
    pub ttl_max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub mode: ExecutionMode,

    /// Planning/execution cycles consumed so far.
    pub hops: u32,

    /// Hard ceiling on `hops`.
    pub ttl_max: u32,

    pub consecutive_failures: u32,
    pub consecutive_successes: u32,

    /// Set when the failure threshold forced `Architect`.
    pub escalated: bool,

    /// Observed environment fingerprints, append-only.
    #[serde(default)]
    pub state_hashes: Vec<String>,

    /// Executor sessions spawned for this task, append-only.
    #[serde(default)]
    pub session_ids: Vec<SessionId>,
}

impl Envelope {
    pub fn new(mode: ExecutionMode, ttl_max: u32) -> Self {
        Self {
            mode,
            hops: 0,
            ttl_max,
            consecutive_failures: 0,
            consecutive_successes: 0,
            escalated: false,
            state_hashes: Vec::new(),
            session_ids: Vec::new(),
        }
    }

    pub fn ttl_exhausted(&self) -> bool {
        self.hops >= self.ttl_max
    }

    /// Consume one hop. Never lets `hops` pass `ttl_max`.
    pub fn begin_hop(&mut self) -> Result<u32, TtlExhausted> {
        if self.ttl_exhausted() {
            return Err(TtlExhausted {
                hops: self.hops,
                ttl_max: self.ttl_max,
            });
        }
        self.hops += 1;
        Ok(self.hops)
    }

    pub fn record_success(&mut self) {
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    /// Force deep-analysis mode after a failure streak.
    pub fn escalate(&mut self) {
        self.mode = ExecutionMode::Architect;
        self.escalated = true;
    }

    /// Reverse an escalation after a recovery streak.
    pub fn de_escalate(&mut self) {
        self.mode = ExecutionMode::Execute;
        self.escalated = false;
    }

    /// Return to plain execution once analysis produced a revised plan.
    /// `escalated` stays set; only a recovery streak clears it.
    pub fn resume_execute(&mut self) {
        self.mode = ExecutionMode::Execute;
    }

    pub fn record_state_hash(&mut self, hash: impl Into<String>) {
        self.state_hashes.push(hash.into());
    }

    pub fn record_session(&mut self, session_id: SessionId) {
        self.session_ids.push(session_id);
    }
}
