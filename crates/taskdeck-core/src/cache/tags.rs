use std::fmt;

use crate::models::TaskId;

/// Logical label carried by cached read results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvalidationTag {
    /// Every filtered/paginated variant of the task list
    TaskList,
    TaskStats,
    Task(TaskId),
    Profile,
}

impl fmt::Display for InvalidationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationTag::TaskList => f.write_str("tasks"),
            InvalidationTag::TaskStats => f.write_str("task-stats"),
            InvalidationTag::Task(id) => write!(f, "task#{}", id),
            InvalidationTag::Profile => f.write_str("profile"),
        }
    }
}

/// Every mutating operation, with the fixed set of reads it makes stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateTask,
    UpdateTask(TaskId),
    UpdateTaskStatus(TaskId),
    DeleteTask(TaskId),
    BulkUpdateStatus(Vec<TaskId>),
    BulkDelete(Vec<TaskId>),
    UpdateProfile,
}

impl Mutation {
    /// Tags to invalidate once this mutation has succeeded. Errs on the side
    /// of a superset: anything touching a task also touches the list and
    /// the stats.
    pub fn invalidates(&self) -> Vec<InvalidationTag> {
        use InvalidationTag::*;

        match self {
            Mutation::CreateTask => vec![TaskList, TaskStats],
            Mutation::UpdateTask(id) | Mutation::UpdateTaskStatus(id) | Mutation::DeleteTask(id) => {
                vec![TaskList, TaskStats, Task(*id)]
            }
            Mutation::BulkUpdateStatus(ids) | Mutation::BulkDelete(ids) => {
                let mut tags = vec![TaskList, TaskStats];
                tags.extend(ids.iter().map(|id| Task(*id)));
                tags
            }
            Mutation::UpdateProfile => vec![Profile],
        }
    }
}
