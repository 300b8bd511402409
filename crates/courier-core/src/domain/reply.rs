//! Planner replies, validated at the boundary.
//!
//! Planners are typically backed by a language model and answer with loosely
//! structured JSON. Everything downstream works on the typed variants below;
//! optional fields default instead of failing, while a reply with no usable
//! JSON object or an unknown verdict is `CollaboratorError::Malformed`.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use super::envelope::ExecutionMode;
use super::errors::CollaboratorError;
use super::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Intent classification of a free-text message or task description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type", default = "default_task_type")]
    pub task_type: String,

    #[serde(default = "default_mode")]
    pub mode: ExecutionMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,

    #[serde(default)]
    pub complexity: Complexity,

    #[serde(default)]
    pub estimated_steps: u32,

    /// Direct answer for simple messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

fn default_task_type() -> String {
    "generic".to_string()
}

fn default_mode() -> ExecutionMode {
    ExecutionMode::Execute
}

impl Classification {
    pub fn new(task_type: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            task_type: task_type.into(),
            mode,
            software: None,
            complexity: Complexity::Unknown,
            estimated_steps: 0,
            answer: None,
        }
    }

    pub fn is_simple(&self) -> bool {
        self.task_type.eq_ignore_ascii_case("simple")
    }
}

/// Root-cause analysis produced in ARCHITECT mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub root_cause: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_plan: Option<Plan>,

    /// Clamped into `[0, 1]`; absent means no confidence.
    #[serde(default, deserialize_with = "unit_interval")]
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,

    #[serde(default)]
    pub should_escalate_to_human: bool,
}

impl Analysis {
    /// The revised plan, if it can be swapped in without human review.
    pub fn usable_revision(&self) -> Option<&Plan> {
        if self.should_escalate_to_human {
            return None;
        }
        self.revised_plan.as_ref().filter(|plan| plan.is_usable())
    }
}

fn unit_interval<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if raw.is_nan() {
        return Ok(0.0);
    }
    Ok(raw.clamp(0.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    #[serde(alias = "pass", alias = "Pass")]
    Pass,

    #[serde(alias = "retry", alias = "Retry")]
    Retry,

    /// Human judgment required.
    #[serde(alias = "escalate", alias = "Escalate")]
    Escalate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub status: Verdict,

    #[serde(default)]
    pub reason: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl Verification {
    pub fn new(status: Verdict, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            suggestions: Vec::new(),
        }
    }
}

/// Parse a collaborator reply into one of the typed variants.
///
/// Surrounding prose or code fences are ignored: the outermost `{ ... }` is
/// taken as the payload.
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T, CollaboratorError> {
    let json = extract_object(raw)
        .ok_or_else(|| CollaboratorError::Malformed("no JSON object in reply".to_string()))?;
    serde_json::from_str(json).map_err(|e| CollaboratorError::Malformed(e.to_string()))
}

fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn classification_from_fenced_reply() {
        let raw = "Sure!\n```json\n{\"type\": \"data_entry\", \"mode\": \"SUPERVISE\", \"software\": \"SAP GUI\", \"complexity\": \"high\", \"estimated_steps\": 7}\n```";
        let c: Classification = parse_reply(raw).unwrap();
        assert_eq!(c.task_type, "data_entry");
        assert_eq!(c.mode, ExecutionMode::Supervise);
        assert_eq!(c.software.as_deref(), Some("SAP GUI"));
        assert_eq!(c.complexity, Complexity::High);
        assert_eq!(c.estimated_steps, 7);
        assert!(!c.is_simple());
    }

    #[test]
    fn classification_defaults_missing_fields() {
        let c: Classification = parse_reply(r#"{"type": "simple", "complexity": "galactic"}"#).unwrap();
        assert!(c.is_simple());
        assert_eq!(c.mode, ExecutionMode::Execute);
        assert_eq!(c.complexity, Complexity::Unknown);
        assert!(c.answer.is_none());
    }

    #[rstest]
    #[case::above(r#"{"confidence": 1.7}"#, 1.0)]
    #[case::below(r#"{"confidence": -0.2}"#, 0.0)]
    #[case::missing(r#"{"root_cause": "timeout"}"#, 0.0)]
    #[case::inside(r#"{"confidence": 0.4}"#, 0.4)]
    fn analysis_confidence_is_clamped(#[case] raw: &str, #[case] expected: f64) {
        let a: Analysis = parse_reply(raw).unwrap();
        assert_eq!(a.confidence, expected);
    }

    #[test]
    fn revision_requires_steps_and_no_human_escalation() {
        let raw = r#"{"root_cause": "wrong window", "revised_plan": {"steps": [{"action": "focus window"}]}, "confidence": 0.8}"#;
        let a: Analysis = parse_reply(raw).unwrap();
        assert!(a.usable_revision().is_some());

        let empty: Analysis = parse_reply(r#"{"revised_plan": {"steps": []}}"#).unwrap();
        assert!(empty.usable_revision().is_none());

        let human: Analysis = parse_reply(
            r#"{"revised_plan": {"steps": [{"action": "x"}]}, "should_escalate_to_human": true}"#,
        )
        .unwrap();
        assert!(human.usable_revision().is_none());
    }

    #[rstest]
    #[case::upper(r#"{"status": "PASS"}"#, Verdict::Pass)]
    #[case::lower(r#"{"status": "retry", "reason": "field empty"}"#, Verdict::Retry)]
    #[case::title(r#"{"status": "Escalate"}"#, Verdict::Escalate)]
    fn verdict_accepts_common_spellings(#[case] raw: &str, #[case] expected: Verdict) {
        let v: Verification = parse_reply(raw).unwrap();
        assert_eq!(v.status, expected);
    }

    #[rstest]
    #[case::prose("the task looks fine to me")]
    #[case::unknown_verdict(r#"{"status": "MAYBE"}"#)]
    #[case::missing_status(r#"{"reason": "ok"}"#)]
    #[case::truncated(r#"{"status": "PASS""#)]
    fn malformed_verification(#[case] raw: &str) {
        let err = parse_reply::<Verification>(raw).unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed(_)));
    }
}
