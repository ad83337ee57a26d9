//! Command-line arguments.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand};

use taskdeck_core::models::{
    ProfileUpdate, TaskDraft, TaskFilters, TaskId, TaskOrdering, TaskPatch, TaskStatus,
};

#[derive(Parser, Debug)]
#[command(name = "taskdeck", author, version, about = "Command-line client for the taskdeck task service", long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sign in (prompts for the password)
    Login {
        /// Defaults to the last username that signed in
        username: Option<String>,
    },

    /// Sign out and forget stored credentials
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Create an account
    Register {
        username: String,
        email: String,
        #[arg(long = "first")]
        first_name: Option<String>,
        #[arg(long = "last")]
        last_name: Option<String>,
    },

    /// Change your password
    Passwd,

    /// Show or update your profile
    Profile {
        #[arg(long)]
        email: Option<String>,
        #[arg(long = "first")]
        first_name: Option<String>,
        #[arg(long = "last")]
        last_name: Option<String>,
    },

    /// List tasks
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Show one task
    Show {
        #[arg(value_parser = parse_id)]
        id: TaskId,
    },

    /// Create a task
    Add(AddArgs),

    /// Change a task's title, description or due date
    Edit(EditArgs),

    /// Mark a task done
    Done {
        #[arg(value_parser = parse_id)]
        id: TaskId,
    },

    /// Archive a task
    Archive {
        #[arg(value_parser = parse_id)]
        id: TaskId,
    },

    /// Move a task back to pending
    Reopen {
        #[arg(value_parser = parse_id)]
        id: TaskId,
    },

    /// Delete a task
    #[command(visible_alias = "delete")]
    Rm {
        #[arg(value_parser = parse_id)]
        id: TaskId,
    },

    /// Task counts by status
    Stats,

    /// Mark several tasks done
    BulkDone {
        #[arg(required = true, value_parser = parse_id)]
        ids: Vec<TaskId>,
    },

    /// Archive several tasks
    BulkArchive {
        #[arg(required = true, value_parser = parse_id)]
        ids: Vec<TaskId>,
    },

    /// Delete several tasks
    BulkRm {
        #[arg(required = true, value_parser = parse_id)]
        ids: Vec<TaskId>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// pending, done or archived
    #[arg(long, value_parser = parse_status)]
    pub status: Option<TaskStatus>,

    #[arg(long)]
    pub search: Option<String>,

    #[arg(long, conflicts_with = "not_overdue")]
    pub overdue: bool,

    #[arg(long)]
    pub not_overdue: bool,

    /// Due on or before this day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub due_before: Option<NaiveDate>,

    /// Due on or after this day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub due_after: Option<NaiveDate>,

    /// Created on this day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub created: Option<NaiveDate>,

    /// created_at, updated_at, due_date or title; prefix '-' for descending
    #[arg(long, value_parser = parse_ordering, allow_hyphen_values = true)]
    pub order: Option<TaskOrdering>,

    #[arg(long)]
    pub page: Option<u32>,
}

impl ListArgs {
    pub fn filters(&self) -> TaskFilters {
        let overdue = match (self.overdue, self.not_overdue) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        TaskFilters {
            status: self.status,
            search: non_empty(self.search.clone()),
            overdue,
            due_date_lte: self.due_before,
            due_date_gte: self.due_after,
            created_date: self.created,
            ordering: self.order,
            page: self.page,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(long = "desc")]
    pub description: Option<String>,

    /// YYYY-MM-DD (end of that day, UTC) or RFC 3339
    #[arg(long, value_parser = parse_due)]
    pub due: Option<DateTime<Utc>>,

    #[arg(long, value_parser = parse_status, default_value = "pending")]
    pub status: TaskStatus,
}

impl AddArgs {
    pub fn draft(&self) -> TaskDraft {
        let mut draft = TaskDraft::new(self.title.join(" "));
        draft.description = non_empty(self.description.clone());
        draft.due_date = self.due;
        draft.status = self.status;
        draft
    }
}

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("change")
        .required(true)
        .multiple(true)
        .args(["title", "description", "due"])
))]
pub struct EditArgs {
    #[arg(value_parser = parse_id)]
    pub id: TaskId,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long = "desc")]
    pub description: Option<String>,

    #[arg(long, value_parser = parse_due)]
    pub due: Option<DateTime<Utc>>,
}

impl EditArgs {
    pub fn patch(&self) -> TaskPatch {
        TaskPatch {
            title: self.title.clone(),
            description: self.description.clone(),
            due_date: self.due,
            ..Default::default()
        }
    }
}

/// Profile fields given on the command line; `None` when nothing changes.
pub fn profile_update(
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
) -> Option<ProfileUpdate> {
    if email.is_none() && first_name.is_none() && last_name.is_none() {
        return None;
    }
    Some(ProfileUpdate {
        email,
        first_name,
        last_name,
    })
}

fn parse_id(raw: &str) -> Result<TaskId, String> {
    raw.trim_start_matches('#')
        .parse()
        .map_err(|_| format!("invalid task id: {}", raw))
}

fn parse_status(raw: &str) -> Result<TaskStatus, String> {
    raw.parse()
}

fn parse_ordering(raw: &str) -> Result<TaskOrdering, String> {
    raw.parse()
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("invalid date: {}", raw))
}

/// A due date: full RFC 3339 timestamp, or a day (meaning the end of it, UTC).
fn parse_due(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_date(raw)?
        .and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date: {}", raw))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
