//! Pending / processing / finished sets with atomic moves.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::trace;

use super::QueueError;
use crate::domain::{TaskId, TaskStatus};
use crate::observability::QueueCounts;

/// Admission-controlled work queue.
///
/// Design:
/// - The queue holds `TaskId`s only; records live in the scheduler's registry.
/// - Every id is in at most one of the three sets; each method moves it in one step.
/// - `pending` is FIFO with no reordering and no deduplication.
#[derive(Debug)]
pub struct WorkQueue {
    pending: VecDeque<TaskId>,
    processing: HashSet<TaskId>,
    finished: HashMap<TaskId, TaskStatus>,
    max_concurrent: usize,
}

impl WorkQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            processing: HashSet::new(),
            finished: HashMap::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Append to the tail of the pending sequence.
    pub fn enqueue(&mut self, task_id: TaskId) -> Result<(), QueueError> {
        if let Some(status) = self.finished.get(&task_id) {
            return Err(QueueError::Finished(task_id, *status));
        }
        self.pending.push_back(task_id);
        trace!(%task_id, pending = self.pending.len(), "enqueued");
        Ok(())
    }

    /// Pop the head of `pending` into `processing`, if below the cap.
    pub fn admit(&mut self) -> Option<TaskId> {
        if self.processing.len() >= self.max_concurrent {
            return None;
        }
        let task_id = self.pending.pop_front()?;
        self.processing.insert(task_id);
        Some(task_id)
    }

    /// Admit as many tasks as the cap allows.
    pub fn admit_available(&mut self) -> Vec<TaskId> {
        std::iter::from_fn(|| self.admit()).collect()
    }

    /// Move a processed task back to the tail of `pending` for its next hop.
    pub fn requeue(&mut self, task_id: TaskId) -> Result<(), QueueError> {
        if !self.processing.remove(&task_id) {
            return Err(QueueError::NotProcessing(task_id));
        }
        self.pending.push_back(task_id);
        Ok(())
    }

    /// Move a processed task into the finished set. Irreversible.
    pub fn finish(&mut self, task_id: TaskId, status: TaskStatus) -> Result<(), QueueError> {
        if !status.is_terminal() {
            return Err(QueueError::NotTerminal(task_id, status));
        }
        if !self.processing.remove(&task_id) {
            return Err(QueueError::NotProcessing(task_id));
        }
        self.finished.insert(task_id, status);
        Ok(())
    }

    /// Waiting in `pending` or currently in flight.
    pub fn is_queued(&self, task_id: TaskId) -> bool {
        self.processing.contains(&task_id) || self.pending.contains(&task_id)
    }

    pub fn finished_status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.finished.get(&task_id).copied()
    }

    /// Nothing pending and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.processing.is_empty()
    }

    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts {
            pending: self.pending.len(),
            processing: self.processing.len(),
            ..QueueCounts::default()
        };
        for status in self.finished.values() {
            match status {
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::NeedsHuman => counts.needs_human += 1,
                TaskStatus::DeadLettered => counts.dead_lettered += 1,
                _ => {}
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn ids(n: usize) -> Vec<TaskId> {
        (0..n).map(|_| TaskId::from_ulid(Ulid::new())).collect()
    }

    #[test]
    fn admission_respects_cap() {
        let mut queue = WorkQueue::new(3);
        let ids = ids(5);
        for id in &ids {
            queue.enqueue(*id).unwrap();
        }

        let admitted = queue.admit_available();
        assert_eq!(admitted, ids[..3].to_vec());
        assert_eq!(queue.counts().processing, 3);
        assert_eq!(queue.counts().pending, 2);

        // Still at the cap.
        assert!(queue.admit().is_none());

        queue.finish(ids[0], TaskStatus::Completed).unwrap();
        assert_eq!(queue.admit(), Some(ids[3]));
        assert_eq!(queue.counts().processing, 3);
    }

    #[test]
    fn requeue_goes_to_the_tail() {
        let mut queue = WorkQueue::new(1);
        let ids = ids(3);
        for id in &ids {
            queue.enqueue(*id).unwrap();
        }

        let first = queue.admit().unwrap();
        queue.requeue(first).unwrap();

        assert_eq!(queue.admit(), Some(ids[1]));
        queue.requeue(ids[1]).unwrap();
        assert_eq!(queue.admit(), Some(ids[2]));
        queue.requeue(ids[2]).unwrap();
        assert_eq!(queue.admit(), Some(ids[0]));
    }

    #[test]
    fn finished_tasks_cannot_come_back() {
        let mut queue = WorkQueue::new(2);
        let id = ids(1)[0];
        queue.enqueue(id).unwrap();
        queue.admit().unwrap();
        queue.finish(id, TaskStatus::DeadLettered).unwrap();

        assert_eq!(
            queue.enqueue(id),
            Err(QueueError::Finished(id, TaskStatus::DeadLettered))
        );
        assert_eq!(queue.requeue(id), Err(QueueError::NotProcessing(id)));
        assert_eq!(queue.finished_status(id), Some(TaskStatus::DeadLettered));
        assert!(queue.is_idle());
    }

    #[test]
    fn finish_requires_terminal_status() {
        let mut queue = WorkQueue::new(2);
        let id = ids(1)[0];
        queue.enqueue(id).unwrap();
        queue.admit().unwrap();

        assert_eq!(
            queue.finish(id, TaskStatus::Retrying),
            Err(QueueError::NotTerminal(id, TaskStatus::Retrying))
        );
        assert!(queue.is_queued(id));
        assert_eq!(queue.counts().processing, 1);
    }

    #[test]
    fn counts_split_finished_by_status() {
        let mut queue = WorkQueue::new(3);
        let ids = ids(3);
        for id in &ids {
            queue.enqueue(*id).unwrap();
        }
        queue.admit_available();
        queue.finish(ids[0], TaskStatus::Completed).unwrap();
        queue.finish(ids[1], TaskStatus::NeedsHuman).unwrap();
        queue.finish(ids[2], TaskStatus::DeadLettered).unwrap();

        let counts = queue.counts();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.needs_human, 1);
        assert_eq!(counts.dead_lettered, 1);
        assert_eq!(counts.pending + counts.processing, 0);
    }
}
