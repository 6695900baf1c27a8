//! Bounded FIFO admission of tasks into active slots.

use std::collections::{HashSet, VecDeque};

use bulkferry_transfer::TaskId;

/// FIFO queue of waiting tasks plus the set of admitted ones.
///
/// Pure bookkeeping: admitting an id does not start anything, the
/// manager does that with what [`admit_next`](Self::admit_next) returns.
#[derive(Debug)]
pub struct AdmissionQueue {
    queue: VecDeque<TaskId>,
    active: HashSet<TaskId>,
    max_concurrent: usize,
}

impl AdmissionQueue {
    /// Creates a queue allowing `max_concurrent` active tasks (at least 1).
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            active: HashSet::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Appends `id` at the tail.
    ///
    /// Returns `false` if it is already queued or active.
    pub fn enqueue(&mut self, id: TaskId) -> bool {
        if self.active.contains(&id) || self.queue.contains(&id) {
            return false;
        }
        self.queue.push_back(id);
        true
    }

    /// Pops the head of the queue into the active set if a slot is free.
    pub fn admit_next(&mut self) -> Option<TaskId> {
        if !self.has_capacity() {
            return None;
        }
        let id = self.queue.pop_front()?;
        self.active.insert(id);
        Some(id)
    }

    /// Frees the slot held by `id`.
    pub fn release(&mut self, id: &TaskId) -> bool {
        self.active.remove(id)
    }

    /// Drops `id` from the waiting queue.
    pub fn remove_queued(&mut self, id: &TaskId) -> bool {
        match self.queue.iter().position(|q| q == id) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.max_concurrent
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Waiting ids in admission order.
    pub fn queued(&self) -> impl Iterator<Item = &TaskId> {
        self.queue.iter()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
