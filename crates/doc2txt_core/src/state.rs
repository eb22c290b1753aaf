use crate::TaskResult;

pub type TaskId = u64;

/// Lifecycle of one task inside the execution harness.
///
/// `Queued -> Running -> {Completed | TimedOut | CrashedWorker}`. Terminal
/// states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Queued,
    Running,
    Completed,
    TimedOut,
    CrashedWorker,
}

impl TaskState {
    /// Returns the running state, or `None` if the task was not queued.
    pub fn start(self) -> Option<TaskState> {
        match self {
            TaskState::Queued => Some(TaskState::Running),
            _ => None,
        }
    }

    /// Returns the terminal state for `result`, or `None` if the task was not
    /// running. A task that never got a worker may crash straight from the
    /// queue.
    pub fn finish(self, result: &TaskResult) -> Option<TaskState> {
        let next = match result {
            TaskResult::Completed(_) => TaskState::Completed,
            TaskResult::TimedOut { .. } => TaskState::TimedOut,
            TaskResult::CrashedWorker { .. } => TaskState::CrashedWorker,
        };
        match (self, next) {
            (TaskState::Running, _) => Some(next),
            (TaskState::Queued, TaskState::CrashedWorker) => Some(next),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::TimedOut | TaskState::CrashedWorker
        )
    }
}
