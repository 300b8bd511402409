//! Outcome model: what the executor reports for a step, and the per-hop report
//! handed to the verifier.

use serde::{Deserialize, Serialize};

use super::envelope::ExecutionMode;
use super::ids::SessionId;
use super::plan::StepMode;

/// When an observation was captured relative to the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationPhase {
    Before,
    After,
}

/// A reference to something produced or observed during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Artifact {
    Stdout(String),
    Stderr(String),

    /// Path to a file produced/used.
    FilePath(String),

    /// Before/after observation from a supervised session (e.g. a screenshot
    /// reference). The core never dereferences it.
    Observation {
        phase: ObservationPhase,
        reference: String,
    },

    Json(serde_json::Value),
}

/// Result of running one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    /// Fingerprint of the environment after the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl StepOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            artifacts: Vec::new(),
            state_hash: None,
            session_id: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            artifacts: Vec::new(),
            state_hash: None,
            session_id: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_state_hash(mut self, hash: impl Into<String>) -> Self {
        self.state_hash = Some(hash.into());
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum StepDisposition {
    Ran { outcome: StepOutcome },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub action: String,
    pub mode: StepMode,
    #[serde(flatten)]
    pub disposition: StepDisposition,
}

/// Everything the executor did during one hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Task mode the hop ran under.
    pub mode: ExecutionMode,
    pub steps: Vec<StepReport>,
}

impl ExecutionReport {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            steps: Vec::new(),
        }
    }

    pub fn ran(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.disposition, StepDisposition::Ran { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.steps.len() - self.ran()
    }

    /// True when some executed step reported failure.
    pub fn has_failure(&self) -> bool {
        self.steps.iter().any(|s| {
            matches!(&s.disposition, StepDisposition::Ran { outcome } if !outcome.success)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_is_tagged_enum() {
        let a = Artifact::Observation {
            phase: ObservationPhase::After,
            reference: "shots/42.png".to_string(),
        };
        let v: serde_json::Value = serde_json::to_value(&a).unwrap();
        assert_eq!(v["kind"], "Observation");
        assert_eq!(v["value"]["phase"], "after");
        assert_eq!(v["value"]["reference"], "shots/42.png");
    }

    #[test]
    fn minimal_outcome_tolerates_missing_fields() {
        let o: StepOutcome = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!o.success);
        assert!(o.error.is_none());
        assert!(o.artifacts.is_empty());
    }

    #[test]
    fn report_counts_ran_and_skipped() {
        let mut report = ExecutionReport::new(ExecutionMode::Execute);
        report.steps.push(StepReport {
            index: 0,
            action: "type invoice number".to_string(),
            mode: StepMode::Execute,
            disposition: StepDisposition::Ran {
                outcome: StepOutcome::failure("field not found"),
            },
        });
        report.steps.push(StepReport {
            index: 1,
            action: "click save".to_string(),
            mode: StepMode::Supervise,
            disposition: StepDisposition::Skipped {
                reason: "needs SUPERVISE".to_string(),
            },
        });

        assert_eq!(report.ran(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(report.has_failure());
    }
}
