//! Plain-text rendering of tasks, stats and users.

use taskdeck_core::api::ErrorDetail;
use taskdeck_core::models::{Paginated, Task, TaskStats, TaskStatus, User};

/// Width of the title column in task listings
const TITLE_WIDTH: usize = 40;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

fn status_marker(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "[ ]",
        TaskStatus::Done => "[x]",
        TaskStatus::Archived => "[-]",
    }
}

pub fn task_line(task: &Task) -> String {
    let overdue = if task.is_overdue { "  OVERDUE" } else { "" };
    format!(
        "{:>5}  {} {:<width$}  due {}{}",
        task.id,
        status_marker(task.status),
        truncate_string(&task.title, TITLE_WIDTH),
        task.due_display(),
        overdue,
        width = TITLE_WIDTH
    )
}

pub fn task_page(page: &Paginated<Task>) -> String {
    if page.results.is_empty() {
        return "No tasks found.".to_string();
    }
    let mut lines: Vec<String> = page.results.iter().map(task_line).collect();
    let mut footer = format!("{} of {} task(s)", page.results.len(), page.count);
    if page.next.is_some() {
        footer.push_str(" - more with --page");
    }
    lines.push(footer);
    lines.join("\n")
}

pub fn task_detail(task: &Task) -> String {
    let mut lines = vec![
        format!("#{} {}", task.id, task.title),
        format!("Status:  {}", task.status.display_name()),
        format!("Due:     {}", task.due_display()),
        format!("Created: {}", task.created_at.format("%b %d, %Y %H:%M")),
    ];
    if task.is_overdue {
        lines.push("Overdue: yes".to_string());
    }
    if let Some(ref description) = task.description {
        if !description.trim().is_empty() {
            lines.push(String::new());
            lines.push(description.trim().to_string());
        }
    }
    lines.join("\n")
}

pub fn stats(stats: &TaskStats) -> String {
    format!(
        "Total:    {}\nPending:  {}\nDone:     {}\nArchived: {}\nOverdue:  {}",
        stats.total, stats.pending, stats.done, stats.archived, stats.overdue
    )
}

pub fn user(user: &User) -> String {
    let mut out = format!("{} ({})", user.display_name(), user.username);
    if !user.email.is_empty() {
        out.push_str(&format!(" <{}>", user.email));
    }
    out
}

/// Field-level validation messages, one per line.
pub fn field_errors(detail: &ErrorDetail) -> Vec<String> {
    detail
        .fields
        .iter()
        .flat_map(|(field, messages)| messages.iter().map(move |m| format!("  {}: {}", field, m)))
        .collect()
}
