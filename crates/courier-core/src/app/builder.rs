//! SchedulerBuilder - コラボレータのワイヤリング
//!
//! # 方針
//! - Planner / Executor / TaskStore は必須。足りなければ build() で即エラー（Fail-fast）
//! - Decider / Clock / IdGenerator は既定実装で埋める
//! - 設定値は `CourierConfig` からまとめて流し込める

use std::sync::Arc;
use std::time::Duration;

use super::lifecycle::{Lifecycle, Registry};
use super::scheduler::Scheduler;
use super::service::TaskService;
use crate::config::CourierConfig;
use crate::domain::{Decider, DefaultDecider, EscalationPolicy};
use crate::ports::{Clock, Executor, IdGenerator, Planner, SystemClock, TaskStore, UlidGenerator};

/// Wires collaborators into a [`Scheduler`] and its [`TaskService`].
///
/// # 使用例
/// ```ignore
/// let app = SchedulerBuilder::new()
///     .planner(planner)
///     .executor(executor)
///     .store(store)
///     .config(&config)
///     .build()?;
/// app.service.submit(NewTask::new("enter invoice 4711")).await?;
/// app.scheduler.drain().await;
/// ```
pub struct SchedulerBuilder {
    planner: Option<Arc<dyn Planner>>,
    executor: Option<Arc<dyn Executor>>,
    store: Option<Arc<dyn TaskStore>>,
    decider: Option<Arc<dyn Decider>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    policy: EscalationPolicy,
    ttl_max: u32,
    max_concurrent: usize,
    poll_interval: Duration,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing collaborator: {0}. Register it on the builder before build().")]
    MissingCollaborator(&'static str),
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        let defaults = CourierConfig::default();
        Self {
            planner: None,
            executor: None,
            store: None,
            decider: None,
            clock: None,
            ids: None,
            policy: defaults.policy.escalation(),
            ttl_max: defaults.policy.ttl_max,
            max_concurrent: defaults.scheduler.max_concurrent,
            poll_interval: defaults.scheduler.poll_interval(),
        }
    }

    pub fn planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the threshold-based decider.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn ttl_max(mut self, ttl_max: u32) -> Self {
        self.ttl_max = ttl_max;
        self
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Scheduler and policy settings from a loaded config. The store section
    /// is the caller's business.
    pub fn config(self, config: &CourierConfig) -> Self {
        self.policy(config.policy.escalation())
            .ttl_max(config.policy.ttl_max)
            .max_concurrent(config.scheduler.max_concurrent)
            .poll_interval(config.scheduler.poll_interval())
    }

    pub fn build(self) -> Result<App, BuildError> {
        let planner = self
            .planner
            .ok_or(BuildError::MissingCollaborator("planner"))?;
        let executor = self
            .executor
            .ok_or(BuildError::MissingCollaborator("executor"))?;
        let store = self.store.ok_or(BuildError::MissingCollaborator("store"))?;

        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(self.policy)));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));

        let registry = Registry::default();
        let lifecycle = Lifecycle::new(
            planner.clone(),
            executor,
            store.clone(),
            decider,
            clock.clone(),
            registry.clone(),
        );
        let scheduler = Scheduler::new(
            lifecycle,
            registry,
            store,
            clock.clone(),
            self.max_concurrent,
            self.poll_interval,
        );
        let service = TaskService::new(scheduler.clone(), planner, ids, clock, self.ttl_max);

        Ok(App { scheduler, service })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The wired application: the scheduler to drive, the service to call.
#[derive(Clone)]
pub struct App {
    pub scheduler: Scheduler,
    pub service: TaskService,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{MemoryTaskStore, Script, ScriptedExecutor, ScriptedPlanner};

    fn planner() -> Arc<dyn Planner> {
        Arc::new(ScriptedPlanner::from_script(&Script::default()))
    }

    fn executor() -> Arc<dyn Executor> {
        Arc::new(ScriptedExecutor::default())
    }

    #[test]
    fn build_success() {
        let app = SchedulerBuilder::new()
            .planner(planner())
            .executor(executor())
            .store(Arc::new(MemoryTaskStore::new()))
            .build();
        assert!(app.is_ok());
    }

    #[test]
    fn build_missing_store() {
        let app = SchedulerBuilder::new()
            .planner(planner())
            .executor(executor())
            .build();
        assert!(matches!(app, Err(BuildError::MissingCollaborator("store"))));
    }

    #[test]
    fn build_missing_planner_is_reported_first() {
        let app = SchedulerBuilder::new().build();
        assert!(matches!(app, Err(BuildError::MissingCollaborator("planner"))));
    }

    #[tokio::test]
    async fn config_flows_into_new_tasks() {
        let mut config = CourierConfig::default();
        config.policy.ttl_max = 4;
        let app = SchedulerBuilder::new()
            .planner(planner())
            .executor(executor())
            .store(Arc::new(MemoryTaskStore::new()))
            .config(&config)
            .build()
            .unwrap();

        let (id, _) = app
            .service
            .submit(crate::domain::NewTask::new("count stock"))
            .await
            .unwrap();
        let task = app.service.status(id).await.unwrap();
        assert_eq!(task.envelope.ttl_max, 4);
    }
}
