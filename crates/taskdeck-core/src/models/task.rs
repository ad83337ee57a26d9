use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type TaskId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Done,
    Archived,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
            TaskStatus::Archived => "archived",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Done => "Done",
            TaskStatus::Archived => "Archived",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "done" => Ok(TaskStatus::Done),
            "archived" => Ok(TaskStatus::Archived),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_overdue: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn due_display(&self) -> String {
        match self.due_date {
            Some(due) => due.format("%b %d, %Y").to_string(),
            None => "-".to_string(),
        }
    }
}

/// Body of `POST /tasks/`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Body of `PATCH /tasks/{id}/`; unset fields are left alone by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: u64,
    pub pending: u64,
    pub done: u64,
    pub archived: u64,
    pub overdue: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkUpdateResult {
    pub updated_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeleteResult {
    pub deleted_count: u64,
}

/// Columns the server accepts in `ordering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    CreatedAt,
    UpdatedAt,
    DueDate,
    Title,
}

impl OrderField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderField::CreatedAt => "created_at",
            OrderField::UpdatedAt => "updated_at",
            OrderField::DueDate => "due_date",
            OrderField::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOrdering {
    pub field: OrderField,
    pub descending: bool,
}

impl TaskOrdering {
    pub fn to_param(&self) -> String {
        if self.descending {
            format!("-{}", self.field.as_str())
        } else {
            self.field.as_str().to_string()
        }
    }
}

impl Default for TaskOrdering {
    /// Newest first, matching the server default
    fn default() -> Self {
        Self {
            field: OrderField::CreatedAt,
            descending: true,
        }
    }
}

impl FromStr for TaskOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match name {
            "created_at" | "created" => OrderField::CreatedAt,
            "updated_at" | "updated" => OrderField::UpdatedAt,
            "due_date" | "due" => OrderField::DueDate,
            "title" => OrderField::Title,
            other => return Err(format!("unknown ordering field: {}", other)),
        };
        Ok(Self { field, descending })
    }
}

/// Query filters for `GET /tasks/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub created_date: Option<NaiveDate>,
    pub created_date_gte: Option<NaiveDate>,
    pub created_date_lte: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub due_date_gte: Option<NaiveDate>,
    pub due_date_lte: Option<NaiveDate>,
    pub overdue: Option<bool>,
    pub search: Option<String>,
    pub ordering: Option<TaskOrdering>,
    pub page: Option<u32>,
}

impl TaskFilters {
    /// Query parameters in a stable order, skipping unset and empty values.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut params: Vec<(&str, String)> = Vec::new();

        if let Some(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        let dates = [
            ("created_date", self.created_date),
            ("created_date_gte", self.created_date_gte),
            ("created_date_lte", self.created_date_lte),
            ("due_date", self.due_date),
            ("due_date_gte", self.due_date_gte),
            ("due_date_lte", self.due_date_lte),
        ];
        for (key, date) in dates {
            if let Some(date) = date {
                params.push((key, date.format("%Y-%m-%d").to_string()));
            }
        }
        if let Some(overdue) = self.overdue {
            params.push(("overdue", overdue.to_string()));
        }
        if let Some(ref search) = self.search {
            if !search.trim().is_empty() {
                params.push(("search", search.trim().to_string()));
            }
        }
        if let Some(ordering) = self.ordering {
            params.push(("ordering", ordering.to_param()));
        }
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }

        params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Stable cache variant key for this filter combination.
    pub fn cache_variant(&self) -> String {
        self.to_query()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}
