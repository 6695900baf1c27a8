//! Transfer manager owning tasks, admission, and callbacks.
//!
//! All mutable state sits behind one mutex that is never held across an
//! `.await` or while user callbacks run. Executors and the sampler reach
//! it through [`Shared`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use bulkferry_transfer::{
    Direction, FileRef, SpeedSampler, TaskId, TaskStatus, TransferError, TransferTask,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::TransferManagerState;
use crate::config::TransferConfig;
use crate::scheduler::AdmissionQueue;
use crate::store::ObjectStore;
use crate::{executor, sampler};

/// Callback receiving an aggregate snapshot.
pub type StateCallback = Box<dyn Fn(&TransferManagerState) + Send + Sync>;

/// Bulk transfer manager for one direction.
///
/// Cloning yields another handle to the same manager. Methods that start
/// work (`submit`, `retry`) must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct TransferManager {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) direction: Direction,
    pub(crate) config: TransferConfig,
    pub(crate) store: Arc<dyn ObjectStore>,
    inner: Mutex<Inner>,
    on_progress: RwLock<Vec<StateCallback>>,
    on_complete: RwLock<Vec<StateCallback>>,
}

struct Inner {
    tasks: HashMap<TaskId, TransferTask>,
    /// Submission order.
    order: Vec<TaskId>,
    queue: AdmissionQueue,
    tokens: HashMap<TaskId, CancellationToken>,
    speeds: HashMap<TaskId, SpeedSampler>,
    /// Submitted batches whose completion callbacks have not fired yet.
    batches: BTreeMap<u64, Vec<TaskId>>,
    next_batch: u64,
    sampler_running: bool,
}

impl Inner {
    fn state(&self, direction: Direction) -> TransferManagerState {
        let tasks = self
            .order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .cloned()
            .collect();
        TransferManagerState::from_tasks(direction, tasks)
    }

    fn has_live_tasks(&self) -> bool {
        self.tasks
            .values()
            .any(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Active))
    }

    /// Cancels a pending or active task. Returns `false` for terminal ones.
    fn cancel(&mut self, id: TaskId) -> Result<bool, TransferError> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(TransferError::UnknownTask(id))?;
        match task.status {
            TaskStatus::Pending => {
                self.queue.remove_queued(&id);
            }
            TaskStatus::Active => {
                self.queue.release(&id);
                if let Some(token) = self.tokens.remove(&id) {
                    token.cancel();
                }
                self.speeds.remove(&id);
            }
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Canceled => return Ok(false),
        }
        task.mark_canceled();
        Ok(true)
    }
}

impl TransferManager {
    /// Creates a manager moving files in `direction` through `store`.
    pub fn new(
        direction: Direction,
        config: TransferConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        let queue = AdmissionQueue::new(config.max_concurrent(direction));
        Ok(Self {
            shared: Arc::new(Shared {
                direction,
                config,
                store,
                inner: Mutex::new(Inner {
                    tasks: HashMap::new(),
                    order: Vec::new(),
                    queue,
                    tokens: HashMap::new(),
                    speeds: HashMap::new(),
                    batches: BTreeMap::new(),
                    next_batch: 0,
                    sampler_running: false,
                }),
                on_progress: RwLock::new(Vec::new()),
                on_complete: RwLock::new(Vec::new()),
            }),
        })
    }

    pub fn direction(&self) -> Direction {
        self.shared.direction
    }

    pub fn config(&self) -> &TransferConfig {
        &self.shared.config
    }

    /// Registers a callback invoked after every aggregate recompute.
    pub fn on_progress(&self, callback: impl Fn(&TransferManagerState) + Send + Sync + 'static) {
        self.shared
            .on_progress
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(callback));
    }

    /// Registers a callback invoked once per submitted batch, when every
    /// task has reached a terminal state.
    pub fn on_complete(&self, callback: impl Fn(&TransferManagerState) + Send + Sync + 'static) {
        self.shared
            .on_complete
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(callback));
    }

    /// Queues a batch of files under the remote directory `path`.
    ///
    /// The whole batch is rejected with `InvalidInput` if any file is empty
    /// or has an unusable name. Returns the new task ids in queue order.
    pub fn submit(&self, files: Vec<FileRef>, path: &str) -> Result<Vec<TaskId>, TransferError> {
        let policy = self.shared.config.chunk_policy();
        let tasks = files
            .into_iter()
            .map(|file| TransferTask::new(self.shared.direction, file, path, &policy))
            .collect::<Result<Vec<_>, _>>()?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        let chunked = tasks.iter().filter(|t| t.strategy.is_chunked()).count();
        let batch = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            for task in tasks {
                let id = task.id;
                inner.order.push(id);
                inner.tasks.insert(id, task);
                inner.queue.enqueue(id);
            }
            inner.next_batch += 1;
            inner.batches.insert(inner.next_batch, ids.clone());
            inner.next_batch
        };

        info!(
            direction = %self.shared.direction,
            batch,
            path,
            files = ids.len(),
            chunked,
            "batch submitted"
        );

        self.shared.ensure_sampler();
        self.shared.pump();
        self.shared.publish();
        Ok(ids)
    }

    /// Cancels a pending or active task.
    ///
    /// Returns `Ok(false)` if the task was already terminal.
    pub fn cancel(&self, id: TaskId) -> Result<bool, TransferError> {
        let canceled = self.shared.lock().cancel(id)?;
        if canceled {
            info!(task = %id, "transfer cancelled");
            self.shared.pump();
            self.shared.publish();
        }
        Ok(canceled)
    }

    /// Cancels every pending and active task. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let count = {
            let mut inner = self.shared.lock();
            let live: Vec<TaskId> = inner
                .order
                .iter()
                .copied()
                .filter(|id| {
                    inner
                        .tasks
                        .get(id)
                        .is_some_and(|t| !t.status.is_terminal())
                })
                .collect();
            live.into_iter()
                .filter(|id| matches!(inner.cancel(*id), Ok(true)))
                .count()
        };
        if count > 0 {
            info!(direction = %self.shared.direction, count, "all transfers cancelled");
            self.shared.publish();
        }
        count
    }

    /// Puts a failed or cancelled task back at the tail of the queue.
    ///
    /// Returns `Ok(false)` for tasks in any other state.
    pub fn retry(&self, id: TaskId) -> Result<bool, TransferError> {
        let retried = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            let task = inner
                .tasks
                .get_mut(&id)
                .ok_or(TransferError::UnknownTask(id))?;
            match task.status {
                TaskStatus::Error | TaskStatus::Canceled => {
                    task.reset_for_retry();
                    inner.queue.enqueue(id);
                    true
                }
                TaskStatus::Pending | TaskStatus::Active | TaskStatus::Completed => false,
            }
        };
        if retried {
            info!(task = %id, "transfer re-queued");
            self.shared.ensure_sampler();
            self.shared.pump();
            self.shared.publish();
        }
        Ok(retried)
    }

    /// Drops terminal tasks. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let removed = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            let before = inner.order.len();
            inner.tasks.retain(|_, t| !t.is_terminal());
            let tasks = &inner.tasks;
            inner.order.retain(|id| tasks.contains_key(id));
            before - inner.order.len()
        };
        if removed > 0 {
            debug!(removed, "finished transfers cleared");
            self.shared.publish();
        }
        removed
    }

    /// Current aggregate state.
    pub fn snapshot(&self) -> TransferManagerState {
        self.shared.lock().state(self.shared.direction)
    }

    /// Copy of one task.
    pub fn task(&self, id: TaskId) -> Option<TransferTask> {
        self.shared.lock().tasks.get(&id).cloned()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of a task if `attempt` is still its current, active attempt.
    pub(crate) fn active_task(&self, id: TaskId, attempt: u32) -> Option<TransferTask> {
        self.with_active_task(id, attempt, |t| t.clone())
    }

    /// Runs `f` on the task if `attempt` is still its current, active attempt.
    pub(crate) fn with_active_task<R>(
        &self,
        id: TaskId,
        attempt: u32,
        f: impl FnOnce(&mut TransferTask) -> R,
    ) -> Option<R> {
        let mut inner = self.lock();
        let task = inner.tasks.get_mut(&id)?;
        if task.attempt != attempt || task.status != TaskStatus::Active {
            return None;
        }
        Some(f(task))
    }

    /// Admits queued tasks into free slots and spawns their executors.
    pub(crate) fn pump(self: &Arc<Self>) {
        let now = tokio::time::Instant::now().into_std();
        let admitted = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let mut admitted = Vec::new();
            while let Some(id) = inner.queue.admit_next() {
                let Some(task) = inner.tasks.get_mut(&id) else {
                    inner.queue.release(&id);
                    continue;
                };
                let attempt = task.mark_active();
                let token = CancellationToken::new();
                inner.tokens.insert(id, token.clone());
                inner.speeds.insert(id, SpeedSampler::starting_at(0, now));
                admitted.push((id, attempt, token, task.key.clone()));
            }
            admitted
        };

        for (id, attempt, token, key) in admitted {
            info!(task = %id, %key, attempt, "transfer admitted");
            tokio::spawn(executor::run(Arc::clone(self), id, attempt, token));
        }
    }

    /// Records an executor's outcome, frees its slot, and admits the next task.
    ///
    /// Outcomes of cancelled or superseded attempts are discarded.
    pub(crate) fn finish(
        self: &Arc<Self>,
        id: TaskId,
        attempt: u32,
        outcome: Result<(), TransferError>,
    ) {
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(task) = inner.tasks.get_mut(&id) else {
                return;
            };
            if task.attempt != attempt || task.status != TaskStatus::Active {
                debug!(task = %id, attempt, "discarding stale transfer result");
                return;
            }

            match outcome {
                Ok(()) => {
                    task.mark_completed();
                    info!(task = %id, key = %task.key, bytes = task.size(), "transfer completed");
                }
                Err(TransferError::Canceled) => {
                    task.mark_canceled();
                    info!(task = %id, "transfer cancelled");
                }
                Err(e) => {
                    task.mark_failed(e.user_message());
                    warn!(
                        task = %id,
                        key = %task.key,
                        error = %e,
                        transient = e.is_transient(),
                        "transfer failed"
                    );
                }
            }
            inner.queue.release(&id);
            inner.tokens.remove(&id);
            inner.speeds.remove(&id);
        }

        self.pump();
        self.publish();
    }

    /// Recomputes the aggregate and runs the callbacks.
    ///
    /// Completion callbacks fire once for every submitted batch whose tasks
    /// are all terminal. Removed tasks count as terminal.
    pub(crate) fn publish(&self) {
        let (state, finished) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let state = inner.state(self.direction);
            let tasks = &inner.tasks;
            let mut finished = Vec::new();
            inner.batches.retain(|&batch, ids| {
                let done = ids
                    .iter()
                    .all(|id| tasks.get(id).is_none_or(|t| t.is_terminal()));
                if done {
                    finished.push((batch, ids.len()));
                }
                !done
            });
            (state, finished)
        };

        for callback in self
            .on_progress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            callback(&state);
        }

        for (batch, files) in finished {
            info!(
                direction = %self.direction,
                batch,
                files,
                completed = state.completed_files,
                failed = state.failed_files,
                canceled = state.canceled_files,
                "batch finished"
            );
            for callback in self
                .on_complete
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
            {
                callback(&state);
            }
        }
    }

    /// Starts the sampler unless one is already running.
    pub(crate) fn ensure_sampler(self: &Arc<Self>) {
        let start = {
            let mut inner = self.lock();
            !std::mem::replace(&mut inner.sampler_running, true)
        };
        if start {
            sampler::spawn(
                Arc::downgrade(self),
                self.config.progress_interval(),
                self.config.speed_interval(),
            );
        }
    }

    /// Progress tick. Returns `false` (and marks the sampler stopped) once
    /// no task is pending or active.
    pub(crate) fn progress_tick(&self) -> bool {
        {
            let mut inner = self.lock();
            if !inner.has_live_tasks() {
                inner.sampler_running = false;
                return false;
            }
        }
        self.publish();
        true
    }

    /// Speed tick: updates speed and ETA of every active task.
    pub(crate) fn speed_tick(&self, now: std::time::Instant) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        for (id, sampler) in inner.speeds.iter_mut() {
            if let Some(task) = inner.tasks.get_mut(id)
                && task.status == TaskStatus::Active
            {
                let speed = sampler.sample(task.bytes_transferred, now);
                task.set_speed(speed);
            }
        }
    }
}
