//! Data models for taskdeck entities.
//!
//! - `Task`, `TaskStatus`, `TaskFilters`: task list and its query surface
//! - `TaskDraft`, `TaskPatch`: mutation payloads
//! - `User` and the auth/profile request bodies

pub mod task;
pub mod user;

pub use task::{
    BulkDeleteResult, BulkUpdateResult, OrderField, Paginated, Task, TaskDraft, TaskFilters,
    TaskId, TaskOrdering, TaskPatch, TaskStats, TaskStatus,
};
pub use user::{LoginData, PasswordChange, ProfileUpdate, Registration, User};
pub(crate) use user::{LoginResponse, ProfileResponse, RefreshResponse, RegisterResponse};
