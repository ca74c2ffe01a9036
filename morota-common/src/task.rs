use serde::{Deserialize, Serialize};

use crate::Position;

/// Stable identity of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// No worker has contributed any work yet.
    Pending,
    /// At least one worker has contributed work, but `remaining_work > 0`.
    InProgress,
    /// `remaining_work` has reached zero; all fields are now frozen.
    Done,
}

/// A spatially located unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identity.
    pub id: TaskId,
    /// Location of the task.
    pub position: Position,
    /// Total work required to complete the task. Always `> 0`.
    pub total_work: f64,
    /// Work remaining, in `[0, total_work]`.
    pub remaining_work: f64,
    /// Current status.
    pub status: TaskStatus,
    /// The step at which `status` became `Done`, once it has.
    pub finished_step: Option<u64>,
    /// Work accumulated this step by all contributing workers. Reset every
    /// step before worker stepping, applied during task finalization.
    #[serde(skip)]
    pub(crate) work_this_step: f64,
    /// Whether any worker contributed to this task this step.
    #[serde(skip)]
    pub(crate) contributed_this_step: bool,
}

impl Task {
    /// Construct a new pending task.
    pub fn new(id: TaskId, position: Position, total_work: f64, remaining_work: f64) -> Self {
        assert!(total_work > 0.0, "total_work must be positive");
        Self {
            id,
            position,
            total_work,
            remaining_work: remaining_work.clamp(0.0, total_work),
            status: TaskStatus::Pending,
            finished_step: None,
            work_this_step: 0.0,
            contributed_this_step: false,
        }
    }

    /// `true` once `status` is `Done`.
    pub fn is_done(&self) -> bool {
        matches!(self.status, TaskStatus::Done)
    }

    /// Fraction of work completed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        1.0 - (self.remaining_work / self.total_work)
    }

    /// Reset the per-step scratch fields. Called for every task at the
    /// start of each simulation step (§4.1 step 2).
    pub fn reset_step_scratch(&mut self) {
        if self.is_done() {
            return;
        }
        self.work_this_step = 0.0;
        self.contributed_this_step = false;
    }

    /// Accumulate work contributed by a worker this step.
    pub fn add_work(&mut self, amount: f64) {
        if self.is_done() {
            return;
        }
        self.work_this_step += amount.max(0.0);
        self.contributed_this_step = true;
    }

    /// Apply this step's accumulated work and latch `Done` if exhausted
    /// (§4.1 step 5). Once `Done`, every field is frozen.
    pub fn finalize_step(&mut self, step: u64) {
        if self.is_done() {
            return;
        }
        self.remaining_work = (self.remaining_work - self.work_this_step).max(0.0);
        if self.remaining_work <= 0.0 {
            self.status = TaskStatus::Done;
            self.finished_step = Some(step);
        } else if self.contributed_this_step {
            self.status = TaskStatus::InProgress;
        } else {
            self.status = TaskStatus::Pending;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(total: f64, remaining: f64) -> Task {
        Task::new(TaskId(0), Position::new(0.0, 0.0), total, remaining)
    }

    #[test]
    fn remaining_work_is_nonincreasing() {
        let mut t = task(10.0, 10.0);
        t.reset_step_scratch();
        t.add_work(4.0);
        t.finalize_step(1);
        assert_eq!(t.remaining_work, 6.0);
        t.reset_step_scratch();
        t.add_work(10.0);
        t.finalize_step(2);
        assert_eq!(t.remaining_work, 0.0);
        assert!(t.is_done());
    }

    #[test]
    fn done_task_is_frozen() {
        let mut t = task(5.0, 0.0);
        t.reset_step_scratch();
        t.add_work(1.0);
        t.finalize_step(1);
        assert!(t.is_done());
        let frozen = t.clone();
        t.reset_step_scratch();
        t.add_work(100.0);
        t.finalize_step(2);
        assert_eq!(t, frozen);
    }
}
