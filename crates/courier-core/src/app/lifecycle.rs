//! Lifecycle - 1 パス（classify → plan → execute → verify）の状態遷移
//!
//! - パスは 1 hop だけ進める。複数 hop をまとめて実行しない
//! - ステータスが変わるたびにレコード全体を registry と store に書く
//! - コラボレータの失敗は RETRY 相当の `Signal::Failure` に変換し、外へは伝播しない
//! - 判定そのものは `Decider`（純粋関数）に任せ、ここでは適用だけを行う

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{
    CollaboratorError, Decider, Decision, Envelope, ExecutionMode, ExecutionReport, Signal,
    StepDisposition, StepMode, StepReport, Task, TaskId, TaskStatus,
};
use crate::ports::{Clock, Executor, Planner, TaskStore};

/// Latest committed record per task, shared with the scheduler and service.
pub type Registry = Arc<RwLock<HashMap<TaskId, Task>>>;

const SKIPPED_IN_EXECUTE: &str = "interactive step skipped in EXECUTE mode";

enum Analyzed {
    /// The pass already committed its final status.
    Settled,
    Signal(Signal),
}

pub struct Lifecycle {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    store: Arc<dyn TaskStore>,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,
    registry: Registry,
}

impl Lifecycle {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        store: Arc<dyn TaskStore>,
        decider: Arc<dyn Decider>,
        clock: Arc<dyn Clock>,
        registry: Registry,
    ) -> Self {
        Self {
            planner,
            executor,
            store,
            decider,
            clock,
            registry,
        }
    }

    /// Run exactly one hop for `task` and return the committed record.
    ///
    /// The returned status is either terminal or `Retrying`.
    pub async fn run_pass(&self, mut task: Task) -> Task {
        if task.is_terminal() {
            return task;
        }

        if task.envelope.ttl_exhausted() {
            let reason = format!(
                "TTL exhausted before dispatch: {}/{} hops",
                task.envelope.hops, task.envelope.ttl_max
            );
            let trigger = json!({ "signal": "ttl", "hops": task.envelope.hops });
            self.apply(&mut task, "ttl", Decision::DeadLetter { reason }, trigger)
                .await;
            return task;
        }

        self.commit(&mut task, TaskStatus::Classifying).await;
        let classification = match self.planner.classify(&task.description).await {
            Ok(classification) => classification,
            Err(err) => return self.abort(task, "classify", err).await,
        };
        if task.envelope.hops == 0 && !task.envelope.escalated {
            task.envelope.mode = classification.mode;
        }
        task.classification = Some(classification);

        if task.plan_revised && task.plan.is_some() {
            task.plan_revised = false;
        } else {
            match self.planner.plan(&task).await {
                Ok(plan) if plan.is_usable() => task.plan = Some(plan),
                Ok(_) => {
                    let err = CollaboratorError::Malformed("plan has no steps".to_string());
                    return self.abort(task, "plan", err).await;
                }
                Err(err) => return self.abort(task, "plan", err).await,
            }
        }
        self.commit(&mut task, TaskStatus::Planned).await;

        if let Err(exhausted) = task.envelope.begin_hop() {
            let trigger = json!({ "signal": "ttl", "hops": exhausted.hops });
            let decision = Decision::DeadLetter {
                reason: exhausted.to_string(),
            };
            self.apply(&mut task, "ttl", decision, trigger).await;
            return task;
        }
        self.commit(&mut task, TaskStatus::Executing).await;

        let mode = task.envelope.mode;
        let signal = match mode {
            ExecutionMode::Architect => match self.analyze(&mut task).await {
                Analyzed::Settled => return task,
                Analyzed::Signal(signal) => signal,
            },
            ExecutionMode::Execute | ExecutionMode::Supervise => {
                match self.execute(&mut task, mode).await {
                    Ok(report) => self.verify(&mut task, &report).await,
                    Err(err) => Signal::Failure {
                        error: err.to_string(),
                    },
                }
            }
        };

        self.settle(&mut task, signal).await;
        task
    }

    /// Collaborator failure before dispatch. The hop is charged here so that
    /// every pass consumes exactly one.
    async fn abort(&self, mut task: Task, stage: &str, err: CollaboratorError) -> Task {
        if let Err(exhausted) = task.envelope.begin_hop() {
            debug!(task_id = %task.id, %exhausted, "no hop left to charge");
        }
        warn!(task_id = %task.id, hop = task.envelope.hops, stage, error = %err, "pass aborted");
        let signal = Signal::Failure {
            error: format!("{stage}: {err}"),
        };
        self.settle(&mut task, signal).await;
        task
    }

    async fn execute(
        &self,
        task: &mut Task,
        mode: ExecutionMode,
    ) -> Result<ExecutionReport, CollaboratorError> {
        let steps = task
            .plan
            .as_ref()
            .map(|plan| plan.steps.clone())
            .unwrap_or_default();
        let mut report = ExecutionReport::new(mode);
        // Only this hop's failure is kept; ARCHITECT passes never reach here.
        task.last_error = None;

        for (index, step) in steps.iter().enumerate() {
            if mode == ExecutionMode::Execute && step.mode == StepMode::Supervise {
                debug!(task_id = %task.id, index, action = %step.action, "step skipped");
                report.steps.push(StepReport {
                    index,
                    action: step.action.clone(),
                    mode: step.mode,
                    disposition: StepDisposition::Skipped {
                        reason: SKIPPED_IN_EXECUTE.to_string(),
                    },
                });
                continue;
            }

            let outcome = match step.mode {
                StepMode::Execute => self.executor.run_direct(task, step).await?,
                StepMode::Supervise => self.executor.run_supervised(task, step).await?,
            };
            if let Some(hash) = &outcome.state_hash {
                task.envelope.record_state_hash(hash.clone());
            }
            if let Some(session_id) = outcome.session_id {
                task.envelope.record_session(session_id);
            }

            let failed = !outcome.success;
            if failed {
                task.last_error = Some(
                    outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("step {index} failed: {}", step.action)),
                );
            }
            report.steps.push(StepReport {
                index,
                action: step.action.clone(),
                mode: step.mode,
                disposition: StepDisposition::Ran { outcome },
            });
            if failed {
                break;
            }
        }

        debug!(
            task_id = %task.id,
            ran = report.ran(),
            skipped = report.skipped(),
            failed = report.has_failure(),
            "execution finished"
        );
        Ok(report)
    }

    async fn verify(&self, task: &mut Task, report: &ExecutionReport) -> Signal {
        self.commit(task, TaskStatus::Verifying).await;
        match self.planner.verify(task, report).await {
            Ok(verification) => {
                let signal = Signal::from_verification(&verification);
                task.last_verification = Some(verification);
                signal
            }
            Err(err) => Signal::Failure {
                error: format!("verify: {err}"),
            },
        }
    }

    /// ARCHITECT hop: deep analysis instead of the executor.
    async fn analyze(&self, task: &mut Task) -> Analyzed {
        let analysis = match self.planner.deep_analyze(task).await {
            Ok(analysis) => analysis,
            Err(err) => {
                return Analyzed::Signal(Signal::Failure {
                    error: format!("deep_analyze: {err}"),
                });
            }
        };

        let revision = analysis.usable_revision().cloned();
        let needs_human = analysis.should_escalate_to_human;
        let trigger = json!({
            "signal": "analysis",
            "root_cause": analysis.root_cause,
            "confidence": analysis.confidence,
        });
        let root_cause = analysis.root_cause.clone();
        task.last_analysis = Some(analysis);

        if needs_human {
            let decision = Decision::NeedsHuman {
                reason: format!("deep analysis: {root_cause}"),
            };
            self.apply(task, "deep_analysis", decision, trigger).await;
            return Analyzed::Settled;
        }

        let Some(plan) = revision else {
            return Analyzed::Signal(Signal::Retry {
                reason: format!("deep analysis produced no usable plan: {root_cause}"),
            });
        };

        task.plan = Some(plan);
        task.plan_revised = true;
        task.envelope.resume_execute();
        let now = self.clock.now();
        task.record_decision(
            "deep_analysis",
            "revise_plan",
            trigger,
            Some(snapshot(&task.envelope)),
            now,
        );
        info!(task_id = %task.id, hop = task.envelope.hops, "plan revised, resuming EXECUTE");
        self.commit(task, TaskStatus::Retrying).await;
        Analyzed::Settled
    }

    /// Update counters, ask the decider, apply.
    async fn settle(&self, task: &mut Task, signal: Signal) {
        if let Signal::Failure { error } = &signal {
            task.last_error = Some(error.clone());
        }
        signal.update_counters(&mut task.envelope);
        let decision = self.decider.decide(&task.envelope, &signal);

        let policy = match (&decision, &signal) {
            (Decision::DeadLetter { .. }, _) => "ttl",
            (Decision::Retry { escalate: true, .. }, _)
            | (Decision::Complete { de_escalate: true }, _) => "escalation",
            (_, Signal::Failure { .. }) => "collaborator_failure",
            _ => "verification",
        };
        self.apply(task, policy, decision, trigger_for(&signal)).await;
    }

    async fn apply(&self, task: &mut Task, policy: &str, decision: Decision, trigger: Value) {
        let status = match &decision {
            Decision::Complete { de_escalate } => {
                if *de_escalate {
                    task.envelope.de_escalate();
                }
                TaskStatus::Completed
            }
            Decision::Retry { escalate, .. } => {
                if *escalate {
                    task.envelope.escalate();
                }
                TaskStatus::Retrying
            }
            Decision::DeadLetter { .. } => TaskStatus::DeadLettered,
            Decision::NeedsHuman { .. } => TaskStatus::NeedsHuman,
        };

        let mut context = snapshot(&task.envelope);
        if let Some(reason) = reason_of(&decision) {
            context["reason"] = Value::String(reason.to_string());
        }
        let now = self.clock.now();
        task.record_decision(policy, decision.name(), trigger, Some(context), now);

        info!(
            task_id = %task.id,
            hop = task.envelope.hops,
            mode = %task.envelope.mode,
            decision = %decision,
            "decision applied"
        );
        self.commit(task, status).await;

        if status == TaskStatus::DeadLettered
            && let Err(err) = self.store.dead_letter(task).await
        {
            warn!(task_id = %task.id, error = %err, "failed to write dead letter");
        }
    }

    async fn commit(&self, task: &mut Task, status: TaskStatus) {
        task.set_status(status, self.clock.now());
        debug!(task_id = %task.id, hop = task.envelope.hops, %status, "transition");
        self.registry.write().await.insert(task.id, task.clone());
        if let Err(err) = self.store.save(task).await {
            warn!(task_id = %task.id, %status, error = %err, "failed to persist task record");
        }
    }
}

fn trigger_for(signal: &Signal) -> Value {
    match signal {
        Signal::Pass => json!({ "signal": "pass" }),
        Signal::Retry { reason } => json!({ "signal": "retry", "reason": reason }),
        Signal::Escalate { reason } => json!({ "signal": "escalate", "reason": reason }),
        Signal::Failure { error } => json!({ "signal": "failure", "error": error }),
    }
}

fn reason_of(decision: &Decision) -> Option<&str> {
    match decision {
        Decision::Complete { .. } => None,
        Decision::Retry { reason, .. }
        | Decision::DeadLetter { reason }
        | Decision::NeedsHuman { reason } => Some(reason),
    }
}

fn snapshot(envelope: &Envelope) -> Value {
    json!({
        "mode": envelope.mode,
        "hops": envelope.hops,
        "ttl_max": envelope.ttl_max,
        "consecutive_failures": envelope.consecutive_failures,
        "consecutive_successes": envelope.consecutive_successes,
        "escalated": envelope.escalated,
    })
}
