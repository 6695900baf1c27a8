//! Manager-wide totals derived from the task map.

use bulkferry_transfer::{Direction, TaskId, TaskStatus, TransferTask, percent};
use serde::Serialize;

/// Overall state of all tasks in a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Idle,
    Active,
    Completed,
    Error,
}

/// Snapshot of a manager's tasks plus derived totals.
///
/// Always recomputed from the tasks, never updated in place.
#[derive(Debug, Clone, Serialize)]
pub struct TransferManagerState {
    pub direction: Direction,
    /// Tasks in submission order.
    pub tasks: Vec<TransferTask>,
    pub total_files: usize,
    pub pending_files: usize,
    pub active_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub canceled_files: usize,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    /// `transferred_bytes / total_bytes * 100`, 0 without bytes.
    pub overall_progress: f64,
    pub overall_status: OverallStatus,
}

impl TransferManagerState {
    /// Derives the aggregate from `tasks`.
    pub fn from_tasks(direction: Direction, tasks: Vec<TransferTask>) -> Self {
        let mut state = Self {
            direction,
            total_files: tasks.len(),
            pending_files: 0,
            active_files: 0,
            completed_files: 0,
            failed_files: 0,
            canceled_files: 0,
            total_bytes: 0,
            transferred_bytes: 0,
            overall_progress: 0.0,
            overall_status: OverallStatus::Idle,
            tasks: Vec::new(),
        };

        for task in &tasks {
            match task.status {
                TaskStatus::Pending => state.pending_files += 1,
                TaskStatus::Active => state.active_files += 1,
                TaskStatus::Completed => state.completed_files += 1,
                TaskStatus::Error => state.failed_files += 1,
                TaskStatus::Canceled => state.canceled_files += 1,
            }
            state.total_bytes += task.size();
            state.transferred_bytes += task.bytes_transferred;
        }

        state.overall_progress = percent(state.transferred_bytes, state.total_bytes);
        state.overall_status = state.derive_status();
        state.tasks = tasks;
        state
    }

    fn derive_status(&self) -> OverallStatus {
        let finished = self.completed_files + self.failed_files;
        if self.total_files > 0 && finished == self.total_files {
            if self.failed_files > 0 {
                OverallStatus::Error
            } else {
                OverallStatus::Completed
            }
        } else if self.active_files > 0 || self.transferred_bytes > 0 {
            OverallStatus::Active
        } else {
            OverallStatus::Idle
        }
    }

    /// Returns `true` when there is at least one task and all are terminal.
    pub fn is_settled(&self) -> bool {
        self.total_files > 0 && self.pending_files == 0 && self.active_files == 0
    }

    /// Looks up a task by id.
    pub fn task(&self, id: TaskId) -> Option<&TransferTask> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkferry_transfer::{ChunkPolicy, FileRef};

    fn task(size: usize) -> TransferTask {
        TransferTask::new(
            Direction::Upload,
            FileRef::in_memory("f.bin", vec![0u8; size]),
            "/",
            &ChunkPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn empty_map_is_idle() {
        let state = TransferManagerState::from_tasks(Direction::Upload, Vec::new());
        assert_eq!(state.total_files, 0);
        assert_eq!(state.overall_progress, 0.0);
        assert_eq!(state.overall_status, OverallStatus::Idle);
        assert!(!state.is_settled());
    }

    #[test]
    fn pending_tasks_are_idle() {
        let state = TransferManagerState::from_tasks(Direction::Upload, vec![task(10), task(20)]);
        assert_eq!(state.total_files, 2);
        assert_eq!(state.pending_files, 2);
        assert_eq!(state.total_bytes, 30);
        assert_eq!(state.overall_status, OverallStatus::Idle);
    }

    #[test]
    fn progress_is_byte_weighted() {
        let mut a = task(100);
        a.mark_active();
        a.record_progress(50);
        let mut b = task(300);
        b.mark_active();
        b.record_progress(150);

        let state = TransferManagerState::from_tasks(Direction::Upload, vec![a, b]);
        assert_eq!(state.transferred_bytes, 200);
        assert_eq!(state.overall_progress, 50.0);
        assert_eq!(state.overall_status, OverallStatus::Active);
    }

    #[test]
    fn all_completed_is_completed_at_100() {
        let mut a = task(10);
        a.mark_active();
        a.mark_completed();
        let mut b = task(20);
        b.mark_active();
        b.mark_completed();

        let state = TransferManagerState::from_tasks(Direction::Upload, vec![a, b]);
        assert_eq!(state.completed_files, 2);
        assert_eq!(state.overall_progress, 100.0);
        assert_eq!(state.overall_status, OverallStatus::Completed);
        assert!(state.is_settled());
    }

    #[test]
    fn any_failure_at_the_end_is_error() {
        let mut a = task(10);
        a.mark_active();
        a.mark_completed();
        let mut b = task(10);
        b.mark_active();
        b.mark_failed("Internal Server Error");

        let state = TransferManagerState::from_tasks(Direction::Upload, vec![a, b]);
        assert_eq!(state.failed_files, 1);
        assert_eq!(state.overall_status, OverallStatus::Error);
        assert!(state.overall_progress < 100.0);
    }

    #[test]
    fn failure_with_work_left_is_still_active() {
        let mut a = task(10);
        a.mark_active();
        a.mark_failed("boom");
        let mut b = task(10);
        b.mark_active();

        let state = TransferManagerState::from_tasks(Direction::Upload, vec![a, b]);
        assert_eq!(state.overall_status, OverallStatus::Active);
    }

    #[test]
    fn canceled_tasks_settle_without_failing() {
        let mut a = task(10);
        a.mark_active();
        a.mark_completed();
        let mut b = task(10);
        b.mark_canceled();

        let state = TransferManagerState::from_tasks(Direction::Upload, vec![a, b]);
        assert_eq!(state.canceled_files, 1);
        assert_eq!(state.failed_files, 0);
        assert!(state.is_settled());
        assert_ne!(state.overall_status, OverallStatus::Error);
        assert_eq!(state.overall_progress, 50.0);
    }

    #[test]
    fn lookup_by_id() {
        let a = task(10);
        let id = a.id;
        let state = TransferManagerState::from_tasks(Direction::Upload, vec![a]);
        assert_eq!(state.task(id).map(|t| t.size()), Some(10));
        assert!(state.task(TaskId::new()).is_none());
    }
}
