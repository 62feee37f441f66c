use crate::types::{QueueEntry, TaskResult, TaskState};
use conductor_core::{AgentId, TaskId};
use std::collections::{HashMap, VecDeque};

/// Queued entries, in-progress entries and the completed-result history.
///
/// Every task lives in exactly one of the three. The queue is kept in
/// submission order; [`TaskQueue::prioritized`] gives the scheduling order.
pub struct TaskQueue {
    queued: Vec<QueueEntry>,
    in_progress: HashMap<TaskId, QueueEntry>,
    completed: HashMap<TaskId, TaskResult>,
    completed_order: VecDeque<TaskId>,
    max_completed: usize,
}

impl TaskQueue {
    /// `max_completed` bounds the result history; `0` means unbounded.
    pub fn new(max_completed: usize) -> Self {
        Self {
            queued: Vec::new(),
            in_progress: HashMap::new(),
            completed: HashMap::new(),
            completed_order: VecDeque::new(),
            max_completed,
        }
    }

    /// Insert an unassigned entry, keeping submission order.
    ///
    /// Entries returning from in-progress go back to their original position.
    pub fn enqueue(&mut self, entry: QueueEntry) {
        let pos = self
            .queued
            .partition_point(|e| e.sequence < entry.sequence);
        self.queued.insert(pos, entry);
    }

    /// Queued task ids by descending priority, ties in submission order.
    pub fn prioritized(&self) -> Vec<TaskId> {
        let mut order: Vec<&QueueEntry> = self.queued.iter().collect();
        // Stable: equal priorities keep submission order.
        order.sort_by(|a, b| b.task.priority.cmp(&a.task.priority));
        order.into_iter().map(QueueEntry::id).collect()
    }

    pub fn queued_entry(&self, id: TaskId) -> Option<&QueueEntry> {
        self.queued.iter().find(|e| e.id() == id)
    }

    /// Remove an entry from the queue.
    pub fn take_queued(&mut self, id: TaskId) -> Option<QueueEntry> {
        let pos = self.queued.iter().position(|e| e.id() == id)?;
        Some(self.queued.remove(pos))
    }

    pub fn mark_in_progress(&mut self, entry: QueueEntry) {
        self.in_progress.insert(entry.id(), entry);
    }

    /// Remove an in-progress entry only if it is still on dispatch `generation`.
    pub fn take_in_progress(&mut self, id: TaskId, generation: u64) -> Option<QueueEntry> {
        match self.in_progress.get(&id) {
            Some(entry) if entry.generation == generation => self.in_progress.remove(&id),
            _ => None,
        }
    }

    /// Remove every in-progress entry assigned to `agent`, in submission order.
    pub fn take_in_progress_for(&mut self, agent: AgentId) -> Vec<QueueEntry> {
        let ids: Vec<TaskId> = self
            .in_progress
            .values()
            .filter(|e| e.assigned_agent == Some(agent))
            .map(QueueEntry::id)
            .collect();
        let mut taken: Vec<QueueEntry> = ids
            .into_iter()
            .filter_map(|id| self.in_progress.remove(&id))
            .collect();
        taken.sort_by_key(|e| e.sequence);
        taken
    }

    /// Store a terminal result, evicting the oldest if the history is full.
    pub fn record_result(&mut self, result: TaskResult) {
        let id = result.task_id;
        if self.completed.insert(id, result).is_none() {
            self.completed_order.push_back(id);
        }
        if self.max_completed > 0 {
            while self.completed_order.len() > self.max_completed {
                if let Some(oldest) = self.completed_order.pop_front() {
                    self.completed.remove(&oldest);
                }
            }
        }
    }

    pub fn result(&self, id: TaskId) -> Option<&TaskResult> {
        self.completed.get(&id)
    }

    /// Drop the result history. Returns how many results were removed.
    pub fn clear_completed(&mut self) -> usize {
        let n = self.completed.len();
        self.completed.clear();
        self.completed_order.clear();
        n
    }

    pub fn state(&self, id: TaskId) -> TaskState {
        if self.in_progress.contains_key(&id) {
            TaskState::InProgress
        } else if self.queued.iter().any(|e| e.id() == id) {
            TaskState::Queued
        } else if self.completed.contains_key(&id) {
            TaskState::Completed
        } else {
            TaskState::NotFound
        }
    }

    /// Snapshot of an entry that is queued or in progress.
    pub fn entry(&self, id: TaskId) -> Option<&QueueEntry> {
        self.in_progress.get(&id).or_else(|| self.queued_entry(id))
    }

    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn succeeded_count(&self) -> usize {
        self.completed.values().filter(|r| r.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.completed.values().filter(|r| !r.success).count()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(0)
    }
}
