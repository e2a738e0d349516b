//! Comparison of task snapshots.

use crate::task::TaskInfo;

/// Returns true if two sorted snapshots are the same.
///
/// The comparison is positional, so both sides must be in the order produced
/// by [`TaskFinder::tasks`](crate::TaskFinder::tasks).
#[must_use]
pub fn tasks_equal(a: &[TaskInfo], b: &[TaskInfo]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

/// Returns the tasks that are currently running AND are desired to be running.
#[must_use]
pub fn running_tasks(tasks: &[TaskInfo]) -> Vec<TaskInfo> {
    tasks.iter().filter(|t| t.is_serving()).cloned().collect()
}

/// Returns true if every task was launched from `task_definition`
/// (`family:revision`).
///
/// Deployment tooling polls this after updating a service to learn when the
/// rollout has converged.
#[must_use]
pub fn all_on_definition(tasks: &[TaskInfo], task_definition: &str) -> bool {
    tasks.iter().all(|t| t.task_definition == task_definition)
}
