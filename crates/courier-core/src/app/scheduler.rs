//! Scheduler - admission, concurrent passes, and the control loop.
//!
//! - `WorkQueue` is the single owner of the pending / processing / finished sets
//! - a task id is in `processing` for exactly the duration of its one in-flight pass
//! - passes are never cancelled mid-flight; shutdown stops admission and drains

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::lifecycle::{Lifecycle, Registry};
use crate::domain::{CourierError, Task, TaskId, TaskStatus};
use crate::observability::QueueCounts;
use crate::ports::{Clock, TaskStore};
use crate::queue::WorkQueue;

struct Inner {
    queue: Mutex<WorkQueue>,
    registry: Registry,
    lifecycle: Lifecycle,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    notify: Notify,
    poll_interval: Duration,
}

/// Cheap to clone; all clones drive the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub(crate) fn new(
        lifecycle: Lifecycle,
        registry: Registry,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        max_concurrent: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(WorkQueue::new(max_concurrent)),
                registry,
                lifecycle,
                store,
                clock,
                notify: Notify::new(),
                poll_interval,
            }),
        }
    }

    /// Append a task to the tail of the pending sequence.
    ///
    /// Terminal tasks are rejected, as are ids already waiting or in flight.
    pub async fn enqueue(&self, task: Task) -> Result<TaskId, CourierError> {
        let task_id = task.id;
        if task.is_terminal() {
            return Err(CourierError::AlreadyTerminal(task_id, task.status));
        }

        {
            let mut queue = self.inner.queue.lock().await;
            if let Some(status) = queue.finished_status(task_id) {
                return Err(CourierError::AlreadyTerminal(task_id, status));
            }
            if queue.is_queued(task_id) {
                return Err(CourierError::AlreadyQueued(task_id));
            }
            // Persisted before the id is admissible, so no pass can write first.
            if let Err(err) = self.inner.store.save(&task).await {
                warn!(%task_id, error = %err, "failed to persist task record");
            }
            self.inner
                .registry
                .write()
                .await
                .insert(task_id, task.clone());
            queue.enqueue(task_id).map_err(|e| CourierError::Validation(e.to_string()))?;
        }

        debug!(%task_id, mode = %task.envelope.mode, "task enqueued");
        self.inner.notify.notify_one();
        Ok(task_id)
    }

    /// Run one admission round to completion: admit up to the cap, run those
    /// passes concurrently, apply their dispositions. Returns the number of passes.
    pub async fn step(&self) -> usize {
        let admitted = self.inner.queue.lock().await.admit_available();
        if admitted.is_empty() {
            return 0;
        }

        let mut passes = Passes::default();
        for task_id in &admitted {
            passes.spawn(&self.inner, *task_id).await;
        }
        while let Some(joined) = passes.set.join_next().await {
            passes.settle(&self.inner, joined).await;
        }
        admitted.len()
    }

    /// Step until nothing is pending or in flight. TTL bounds the loop.
    pub async fn drain(&self) -> QueueCounts {
        while self.step().await > 0 {}
        self.counts().await
    }

    /// Control loop: admit under the cap whenever a pass finishes, a task is
    /// enqueued, or the poll interval elapses. Stops admitting on shutdown and
    /// waits for in-flight passes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.inner.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut passes = Passes::default();
        let max_concurrent = self.inner.queue.lock().await.max_concurrent();
        info!(
            poll_ms = self.inner.poll_interval.as_millis() as u64,
            max_concurrent, "scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let admitted = self.inner.queue.lock().await.admit_available();
            for task_id in admitted {
                passes.spawn(&self.inner, task_id).await;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(joined) = passes.set.join_next(), if !passes.set.is_empty() => {
                    passes.settle(&self.inner, joined).await;
                }
                _ = ticker.tick() => {}
                _ = self.inner.notify.notified() => {}
            }
        }

        info!(in_flight = passes.set.len(), "scheduler stopping");
        while let Some(joined) = passes.set.join_next().await {
            passes.settle(&self.inner, joined).await;
        }
        info!("scheduler stopped");
    }

    /// Spawn `run` on the tokio runtime.
    pub fn spawn(&self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();
        let join = tokio::spawn(async move {
            scheduler.run(shutdown_rx).await;
        });
        SchedulerHandle { shutdown_tx, join }
    }

    /// Reload persisted records after a restart.
    ///
    /// Terminal records become visible through the registry; the rest are
    /// marked `Retrying` and re-enqueued oldest first with their hops intact.
    pub async fn recover(&self) -> Result<usize, CourierError> {
        let mut records = self.inner.store.list().await?;
        records.sort_by_key(|t| (t.created_at, t.id));

        let mut recovered = 0;
        for mut task in records {
            if self.inner.registry.read().await.contains_key(&task.id) {
                continue;
            }
            if task.is_terminal() {
                self.inner.registry.write().await.insert(task.id, task);
                continue;
            }

            let previous = task.status;
            let now = self.inner.clock.now();
            task.record_decision(
                "recovery",
                "recovered",
                serde_json::json!({ "signal": "restart", "previous_status": previous }),
                None,
                now,
            );
            task.set_status(TaskStatus::Retrying, now);
            self.enqueue(task).await?;
            recovered += 1;
        }

        if recovered > 0 {
            info!(recovered, "recovered unfinished tasks");
        }
        Ok(recovered)
    }

    pub async fn counts(&self) -> QueueCounts {
        self.inner.queue.lock().await.counts()
    }

    pub async fn is_idle(&self) -> bool {
        self.inner.queue.lock().await.is_idle()
    }

    pub async fn get(&self, task_id: TaskId) -> Option<Task> {
        self.inner.registry.read().await.get(&task_id).cloned()
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.inner.registry.read().await.values().cloned().collect()
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.inner.store
    }
}

/// In-flight passes keyed by tokio task id, so a panicking pass can still be
/// traced back to its `TaskId`.
#[derive(Default)]
struct Passes {
    set: JoinSet<Task>,
    ids: HashMap<tokio::task::Id, TaskId>,
}

impl Passes {
    async fn spawn(&mut self, inner: &Arc<Inner>, task_id: TaskId) {
        let Some(task) = inner.registry.read().await.get(&task_id).cloned() else {
            error!(%task_id, "admitted task missing from registry");
            return;
        };
        let inner = Arc::clone(inner);
        let handle = self
            .set
            .spawn(async move { inner.lifecycle.run_pass(task).await });
        self.ids.insert(handle.id(), task_id);
    }

    async fn settle(&mut self, inner: &Inner, joined: Result<Task, tokio::task::JoinError>) {
        match joined {
            Ok(task) => {
                self.ids.retain(|_, id| *id != task.id);
                finish_or_requeue(inner, &task).await;
            }
            Err(err) => {
                let Some(task_id) = self.ids.remove(&err.id()) else {
                    error!(error = %err, "pass failed for unknown task");
                    return;
                };
                error!(%task_id, error = %err, "pass panicked; requeueing");
                if let Err(err) = inner.queue.lock().await.requeue(task_id) {
                    warn!(%task_id, error = %err, "requeue failed");
                }
            }
        }
    }
}

async fn finish_or_requeue(inner: &Inner, task: &Task) {
    let mut queue = inner.queue.lock().await;
    let moved = if task.is_terminal() {
        queue.finish(task.id, task.status)
    } else {
        queue.requeue(task.id)
    };
    if let Err(err) = moved {
        warn!(task_id = %task.id, error = %err, "queue move rejected");
    }
    drop(queue);
    inner.notify.notify_one();
}

/// Handle for a spawned control loop.
/// - `request_shutdown` stops admission; in-flight passes finish normally
/// - `shutdown_and_join` also waits for the loop to exit
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            error!(error = %err, "scheduler loop panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SchedulerBuilder;
    use crate::domain::{
        CollaboratorError, ExecutionMode, NewTask, PlanStep, StepMode, StepOutcome, StoreError,
    };
    use crate::impls::{
        MemoryTaskStore, Script, ScriptedExecutor, ScriptedPlanner, ScriptedTask, ScriptedVerdict,
    };
    use crate::ports::{Executor, SystemClock};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;
    use ulid::Ulid;

    fn task(description: &str, ttl_max: u32) -> Task {
        Task::new(
            TaskId::from_ulid(Ulid::new()),
            NewTask::new(description).validate().unwrap(),
            ExecutionMode::Execute,
            ttl_max,
            Utc::now(),
        )
    }

    fn scheduler_for(script: &Script, max_concurrent: usize) -> (Scheduler, Arc<MemoryTaskStore>) {
        let store = Arc::new(MemoryTaskStore::new());
        let app = SchedulerBuilder::new()
            .planner(Arc::new(ScriptedPlanner::from_script(script)))
            .executor(Arc::new(ScriptedExecutor::from_script(script)))
            .store(store.clone())
            .max_concurrent(max_concurrent)
            .build()
            .unwrap();
        (app.scheduler, store)
    }

    /// Executor that parks every call until a permit is released.
    struct GatedExecutor {
        gate: Semaphore,
        started: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GatedExecutor {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                started: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        async fn run(&self, step: &PlanStep) -> Result<StepOutcome, CollaboratorError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(StepOutcome::success(step.action.clone()))
        }
    }

    #[async_trait]
    impl Executor for GatedExecutor {
        async fn run_direct(
            &self,
            _task: &Task,
            step: &PlanStep,
        ) -> Result<StepOutcome, CollaboratorError> {
            self.run(step).await
        }

        async fn run_supervised(
            &self,
            _task: &Task,
            step: &PlanStep,
        ) -> Result<StepOutcome, CollaboratorError> {
            self.run(step).await
        }
    }

    async fn wait_for(counter: &AtomicUsize, n: usize) {
        while counter.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn cap_of_three_admits_three_of_five() {
        let executor = Arc::new(GatedExecutor::new());
        let app = SchedulerBuilder::new()
            .planner(Arc::new(ScriptedPlanner::from_script(&Script::default())))
            .executor(executor.clone())
            .store(Arc::new(MemoryTaskStore::new()))
            .max_concurrent(3)
            .build()
            .unwrap();
        let scheduler = app.scheduler;
        for i in 0..5 {
            scheduler.enqueue(task(&format!("task {i}"), 10)).await.unwrap();
        }

        let driver = scheduler.clone();
        let round = tokio::spawn(async move { driver.step().await });
        wait_for(&executor.started, 3).await;

        let counts = scheduler.counts().await;
        assert_eq!(counts.processing, 3);
        assert_eq!(counts.pending, 2);

        executor.gate.add_permits(3);
        assert_eq!(round.await.unwrap(), 3);
        assert_eq!(scheduler.counts().await.completed, 3);

        let driver = scheduler.clone();
        let round = tokio::spawn(async move { driver.step().await });
        wait_for(&executor.started, 5).await;
        assert_eq!(scheduler.counts().await.processing, 2);
        executor.gate.add_permits(2);
        assert_eq!(round.await.unwrap(), 2);

        assert_eq!(scheduler.counts().await.completed, 5);
        assert_eq!(executor.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dead_lettered_task_leaves_the_queue_for_good() {
        let scripted = ScriptedTask::new("close books").with_verdicts([
            ScriptedVerdict::Retry,
            ScriptedVerdict::Retry,
            ScriptedVerdict::Retry,
        ]);
        let script = Script {
            tasks: vec![scripted],
            ..Script::default()
        };
        let (scheduler, store) = scheduler_for(&script, 3);
        let t = task("close books", 3);
        let id = scheduler.enqueue(t.clone()).await.unwrap();

        let counts = scheduler.drain().await;

        assert_eq!(counts.dead_lettered, 1);
        assert_eq!(counts.pending + counts.processing, 0);
        let record = scheduler.get(id).await.unwrap();
        assert_eq!(record.status, TaskStatus::DeadLettered);
        assert_eq!(store.dead_letters().await.unwrap().len(), 1);

        // Neither the stale record nor the final one can come back.
        assert!(matches!(
            scheduler.enqueue(t).await,
            Err(CourierError::AlreadyTerminal(_, TaskStatus::DeadLettered))
        ));
        assert!(matches!(
            scheduler.enqueue(record).await,
            Err(CourierError::AlreadyTerminal(..))
        ));
    }

    #[tokio::test]
    async fn retried_task_goes_behind_waiting_work() {
        let script = Script {
            tasks: vec![ScriptedTask::new("first").with_verdicts([ScriptedVerdict::Retry])],
            ..Script::default()
        };
        let (scheduler, _store) = scheduler_for(&script, 1);
        let first = scheduler.enqueue(task("first", 10)).await.unwrap();
        let second = scheduler.enqueue(task("second", 10)).await.unwrap();

        assert_eq!(scheduler.step().await, 1);
        assert_eq!(scheduler.get(first).await.unwrap().status, TaskStatus::Retrying);

        assert_eq!(scheduler.step().await, 1);
        assert_eq!(scheduler.get(second).await.unwrap().status, TaskStatus::Completed);

        assert_eq!(scheduler.step().await, 1);
        assert_eq!(scheduler.get(first).await.unwrap().status, TaskStatus::Completed);
        assert!(scheduler.is_idle().await);
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_rejected() {
        let (scheduler, _store) = scheduler_for(&Script::default(), 2);
        let t = task("export", 10);
        scheduler.enqueue(t.clone()).await.unwrap();
        assert!(matches!(
            scheduler.enqueue(t).await,
            Err(CourierError::AlreadyQueued(_))
        ));
    }

    #[tokio::test]
    async fn control_loop_runs_until_shutdown() {
        let script = Script {
            tasks: vec![
                ScriptedTask::new("a").with_verdicts([ScriptedVerdict::Retry]),
                ScriptedTask::new("b").with_steps(vec![PlanStep::new("b", StepMode::Execute)]),
            ],
            ..Script::default()
        };
        let (scheduler, store) = scheduler_for(&script, 2);
        let handle = scheduler.spawn();

        let a = scheduler.enqueue(task("a", 10)).await.unwrap();
        let b = scheduler.enqueue(task("b", 10)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.counts().await.completed < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both tasks complete");

        handle.shutdown_and_join().await;
        assert!(scheduler.is_idle().await);
        for id in [a, b] {
            let in_memory = scheduler.get(id).await.unwrap();
            assert_eq!(in_memory.status, TaskStatus::Completed);
            assert_eq!(store.load(id).await.unwrap(), Some(in_memory));
        }
    }

    /// Store whose first write of a task (the `Received` record) is slow.
    struct SlowIntakeStore {
        inner: MemoryTaskStore,
        delay: Duration,
    }

    #[async_trait]
    impl TaskStore for SlowIntakeStore {
        async fn save(&self, task: &Task) -> Result<(), StoreError> {
            if task.status == TaskStatus::Received {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.save(task).await
        }

        async fn load(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
            self.inner.load(id).await
        }

        async fn list(&self) -> Result<Vec<Task>, StoreError> {
            self.inner.list().await
        }

        async fn dead_letter(&self, task: &Task) -> Result<(), StoreError> {
            self.inner.dead_letter(task).await
        }

        async fn dead_letters(&self) -> Result<Vec<Task>, StoreError> {
            self.inner.dead_letters().await
        }
    }

    #[tokio::test]
    async fn slow_intake_write_never_overwrites_a_finished_pass() {
        let store = Arc::new(SlowIntakeStore {
            inner: MemoryTaskStore::new(),
            delay: Duration::from_millis(200),
        });
        let script = Script::default();
        let app = SchedulerBuilder::new()
            .planner(Arc::new(ScriptedPlanner::from_script(&script)))
            .executor(Arc::new(ScriptedExecutor::from_script(&script)))
            .store(store.clone())
            .poll_interval(Duration::from_millis(10))
            .build()
            .unwrap();
        let scheduler = app.scheduler;
        let handle = scheduler.spawn();

        let id = scheduler.enqueue(task("post ledger", 10)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.counts().await.completed < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task completes");
        handle.shutdown_and_join().await;

        let in_memory = scheduler.get(id).await.unwrap();
        assert_eq!(in_memory.status, TaskStatus::Completed);
        assert_eq!(store.load(id).await.unwrap(), Some(in_memory));

        // A restart on the same store finds nothing to redo.
        let restarted = SchedulerBuilder::new()
            .planner(Arc::new(ScriptedPlanner::from_script(&script)))
            .executor(Arc::new(ScriptedExecutor::from_script(&script)))
            .store(store)
            .build()
            .unwrap()
            .scheduler;
        assert_eq!(restarted.recover().await.unwrap(), 0);
        assert_eq!(restarted.get(id).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn recover_requeues_unfinished_records() {
        let store = Arc::new(MemoryTaskStore::new());
        let mut interrupted = task("interrupted", 10);
        interrupted.envelope.begin_hop().unwrap();
        interrupted.set_status(TaskStatus::Executing, Utc::now());
        let mut done = task("done", 10);
        done.set_status(TaskStatus::Completed, Utc::now());
        store.save(&interrupted).await.unwrap();
        store.save(&done).await.unwrap();

        let script = Script::default();
        let app = SchedulerBuilder::new()
            .planner(Arc::new(ScriptedPlanner::from_script(&script)))
            .executor(Arc::new(ScriptedExecutor::from_script(&script)))
            .store(store.clone())
            .clock(Arc::new(SystemClock))
            .build()
            .unwrap();
        let scheduler = app.scheduler;

        assert_eq!(scheduler.recover().await.unwrap(), 1);
        let record = scheduler.get(interrupted.id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Retrying);
        assert_eq!(record.decisions.last().unwrap().decision, "recovered");
        assert_eq!(scheduler.get(done.id).await.unwrap().status, TaskStatus::Completed);
        assert_eq!(scheduler.counts().await.pending, 1);

        scheduler.drain().await;
        let record = scheduler.get(interrupted.id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.envelope.hops, 2);

        // A second recovery finds nothing new.
        assert_eq!(scheduler.recover().await.unwrap(), 0);
    }
}
