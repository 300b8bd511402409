//! Plan model: ordered steps produced by the planner.

use serde::{Deserialize, Serialize};

/// Execution mode declared on an individual step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepMode {
    #[default]
    #[serde(alias = "execute")]
    Execute,

    /// Needs interactive capability; never run by an EXECUTE-mode session.
    #[serde(alias = "supervise")]
    Supervise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: String,

    #[serde(default)]
    pub mode: StepMode,

    /// How the executor (or verifier) can tell the step worked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,

    /// Required capability tags (e.g. `keyboard`, `shell`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

impl PlanStep {
    pub fn new(action: impl Into<String>, mode: StepMode) -> Self {
        Self {
            action: action.into(),
            mode,
            verification: None,
            capabilities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,

    #[serde(
        default,
        alias = "estimated_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_duration_secs: Option<u64>,

    /// Advisory only: recorded on the task, does not gate execution.
    #[serde(default)]
    pub requires_human_approval: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_notes: Vec<String>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// A plan with no steps gives the executor nothing to do.
    pub fn is_usable(&self) -> bool {
        !self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_mode_defaults_to_execute() {
        let step: PlanStep = serde_json::from_str(r#"{"action": "open app"}"#).unwrap();
        assert_eq!(step.mode, StepMode::Execute);
        assert!(step.verification.is_none());
        assert!(step.capabilities.is_empty());
    }

    #[test]
    fn step_mode_accepts_lower_case() {
        let step: PlanStep =
            serde_json::from_str(r#"{"action": "click save", "mode": "supervise"}"#).unwrap();
        assert_eq!(step.mode, StepMode::Supervise);
    }

    #[test]
    fn planner_reply_duration_field_is_kept() {
        let plan: Plan = serde_json::from_str(
            r#"{"steps": [{"action": "open app"}], "estimated_duration": 90, "requires_human_approval": true}"#,
        )
        .unwrap();
        assert_eq!(plan.estimated_duration_secs, Some(90));
        assert!(plan.requires_human_approval);
    }

    #[test]
    fn empty_plan_is_not_usable() {
        assert!(!Plan::default().is_usable());
        assert!(Plan::new(vec![PlanStep::new("x", StepMode::Execute)]).is_usable());
    }
}
