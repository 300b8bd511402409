//! Scripted collaborators - 決定的な Planner / Executor
//!
//! CLI の `simulate` とテストで使う。タスクの description をキーに、
//! 検証の verdict 列と Executor の失敗回数を台本として持つ。
//!
//! 台本 (JSON):
//! ```json
//! {
//!   "tasks": [
//!     { "description": "enter invoice 4711", "target_software": "Lexware",
//!       "verdicts": ["RETRY", "PASS"], "executor_errors": 1 }
//!   ],
//!   "answers": { "what time is it?": "lunch time" }
//! }
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::{
    Analysis, Artifact, Classification, CollaboratorError, ExecutionMode, ExecutionReport,
    NewTask, ObservationPhase, Plan, PlanStep, StepMode, StepOutcome, Task, Verdict,
    Verification,
};
use crate::ports::{Executor, IdGenerator, Planner, SystemClock, UlidGenerator};

/// One verification answer. `Error` makes the verify call itself fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScriptedVerdict {
    #[serde(alias = "pass")]
    Pass,
    #[serde(alias = "retry")]
    Retry,
    #[serde(alias = "escalate")]
    Escalate,
    #[serde(alias = "error")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedTask {
    pub description: String,

    #[serde(default)]
    pub target_software: String,

    #[serde(default)]
    pub task_type: String,

    #[serde(default = "default_mode")]
    pub mode: ExecutionMode,

    /// Plan returned by `plan`. Empty means a single EXECUTE step named after the description.
    #[serde(default)]
    pub steps: Vec<PlanStep>,

    /// Revised plan from `deep_analyze`. Empty means `steps` again.
    #[serde(default)]
    pub revision: Vec<PlanStep>,

    /// Verdicts in hop order. PASS once exhausted.
    #[serde(default)]
    pub verdicts: Vec<ScriptedVerdict>,

    /// Number of executor calls that fail with a tooling error first.
    #[serde(default)]
    pub executor_errors: u32,

    /// Deep analysis recommends a human instead of revising the plan.
    #[serde(default)]
    pub analysis_needs_human: bool,
}

fn default_mode() -> ExecutionMode {
    ExecutionMode::Execute
}

impl ScriptedTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            target_software: String::new(),
            task_type: String::new(),
            mode: ExecutionMode::Execute,
            steps: Vec::new(),
            revision: Vec::new(),
            verdicts: Vec::new(),
            executor_errors: 0,
            analysis_needs_human: false,
        }
    }

    pub fn in_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_steps(mut self, steps: Vec<PlanStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_revision(mut self, steps: Vec<PlanStep>) -> Self {
        self.revision = steps;
        self
    }

    pub fn with_verdicts(mut self, verdicts: impl IntoIterator<Item = ScriptedVerdict>) -> Self {
        self.verdicts = verdicts.into_iter().collect();
        self
    }

    pub fn with_executor_errors(mut self, n: u32) -> Self {
        self.executor_errors = n;
        self
    }

    pub fn with_analysis_needs_human(mut self) -> Self {
        self.analysis_needs_human = true;
        self
    }

    /// Submission for this task.
    pub fn submission(&self) -> NewTask {
        NewTask::new(self.description.clone())
            .for_software(self.target_software.clone())
            .with_type(self.task_type.clone())
    }

    fn plan(&self) -> Plan {
        if self.steps.is_empty() {
            return Plan::new(vec![PlanStep::new(self.description.clone(), StepMode::Execute)]);
        }
        Plan::new(self.steps.clone())
    }

    fn revised_plan(&self) -> Plan {
        if self.revision.is_empty() {
            return self.plan();
        }
        Plan::new(self.revision.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub tasks: Vec<ScriptedTask>,

    /// Messages classified as simple, with their direct answers.
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

impl Script {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug)]
pub struct ScriptedPlanner {
    tasks: HashMap<String, ScriptedTask>,
    answers: HashMap<String, String>,
    verdicts: Mutex<HashMap<String, VecDeque<ScriptedVerdict>>>,
}

impl ScriptedPlanner {
    pub fn from_script(script: &Script) -> Self {
        let tasks: HashMap<_, _> = script
            .tasks
            .iter()
            .map(|t| (t.description.clone(), t.clone()))
            .collect();
        let verdicts = tasks
            .iter()
            .map(|(k, t)| (k.clone(), t.verdicts.iter().copied().collect()))
            .collect();
        Self {
            tasks,
            answers: script.answers.clone(),
            verdicts: Mutex::new(verdicts),
        }
    }

    fn scripted(&self, task: &Task) -> Option<&ScriptedTask> {
        self.tasks.get(&task.description)
    }

    fn plan_for(&self, task: &Task, revised: bool) -> Plan {
        match self.scripted(task) {
            Some(scripted) if revised => scripted.revised_plan(),
            Some(scripted) => scripted.plan(),
            None => Plan::new(vec![PlanStep::new(task.description.clone(), StepMode::Execute)]),
        }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn classify(&self, message: &str) -> Result<Classification, CollaboratorError> {
        if let Some(answer) = self.answers.get(message) {
            let mut classification = Classification::new("simple", ExecutionMode::Execute);
            classification.answer = Some(answer.clone());
            return Ok(classification);
        }
        let Some(scripted) = self.tasks.get(message) else {
            return Ok(Classification::new("generic", ExecutionMode::Execute));
        };
        let task_type = if scripted.task_type.trim().is_empty() {
            "generic"
        } else {
            scripted.task_type.as_str()
        };
        let mut classification = Classification::new(task_type, scripted.mode);
        if !scripted.target_software.is_empty() {
            classification.software = Some(scripted.target_software.clone());
        }
        classification.estimated_steps = scripted.plan().steps.len() as u32;
        Ok(classification)
    }

    async fn plan(&self, task: &Task) -> Result<Plan, CollaboratorError> {
        Ok(self.plan_for(task, false))
    }

    async fn deep_analyze(&self, task: &Task) -> Result<Analysis, CollaboratorError> {
        let needs_human = self
            .scripted(task)
            .is_some_and(|scripted| scripted.analysis_needs_human);
        let root_cause = task
            .last_error
            .clone()
            .unwrap_or_else(|| "repeated verification failures".to_string());
        Ok(Analysis {
            root_cause,
            revised_plan: (!needs_human).then(|| self.plan_for(task, true)),
            confidence: if needs_human { 0.2 } else { 0.7 },
            alternatives: Vec::new(),
            should_escalate_to_human: needs_human,
        })
    }

    async fn verify(
        &self,
        task: &Task,
        report: &ExecutionReport,
    ) -> Result<Verification, CollaboratorError> {
        let next = self
            .verdicts
            .lock()
            .await
            .get_mut(&task.description)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedVerdict::Pass);

        let verification = match next {
            ScriptedVerdict::Pass => Verification::new(Verdict::Pass, "scripted pass"),
            ScriptedVerdict::Retry => Verification::new(
                Verdict::Retry,
                format!("scripted retry after {} step(s)", report.ran()),
            ),
            ScriptedVerdict::Escalate => Verification::new(Verdict::Escalate, "scripted escalate"),
            ScriptedVerdict::Error => {
                return Err(CollaboratorError::Transport(
                    "scripted verifier unavailable".to_string(),
                ));
            }
        };
        Ok(verification)
    }
}

pub struct ScriptedExecutor {
    errors: Mutex<HashMap<String, u32>>,
    ids: Arc<dyn IdGenerator>,
}

impl ScriptedExecutor {
    pub fn from_script(script: &Script) -> Self {
        let errors = script
            .tasks
            .iter()
            .filter(|t| t.executor_errors > 0)
            .map(|t| (t.description.clone(), t.executor_errors))
            .collect();
        Self {
            errors: Mutex::new(errors),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }

    /// Mint supervised session ids from `ids` instead of the system clock.
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    async fn take_error(&self, task: &Task) -> Option<CollaboratorError> {
        let mut errors = self.errors.lock().await;
        let remaining = errors.get_mut(&task.description)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(CollaboratorError::Tooling(format!(
            "scripted executor crash ({} left)",
            remaining
        )))
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::from_script(&Script::default())
    }
}

fn state_hash(task: &Task, step: &PlanStep) -> String {
    let mut hasher = DefaultHasher::new();
    task.id.hash(&mut hasher);
    task.envelope.hops.hash(&mut hasher);
    step.action.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn run_direct(
        &self,
        task: &Task,
        step: &PlanStep,
    ) -> Result<StepOutcome, CollaboratorError> {
        if let Some(err) = self.take_error(task).await {
            return Err(err);
        }
        Ok(StepOutcome::success(format!("ran: {}", step.action))
            .with_artifact(Artifact::Stdout(format!("$ {}", step.action)))
            .with_state_hash(state_hash(task, step)))
    }

    async fn run_supervised(
        &self,
        task: &Task,
        step: &PlanStep,
    ) -> Result<StepOutcome, CollaboratorError> {
        if let Some(err) = self.take_error(task).await {
            return Err(err);
        }
        let session = self.ids.generate_session_id();
        Ok(StepOutcome::success(format!("supervised: {}", step.action))
            .with_artifact(Artifact::Observation {
                phase: ObservationPhase::Before,
                reference: format!("{session}/before"),
            })
            .with_artifact(Artifact::Observation {
                phase: ObservationPhase::After,
                reference: format!("{session}/after"),
            })
            .with_state_hash(state_hash(task, step))
            .with_session(session))
    }
}
