use crate::model::query::QueryKey;
use crate::model::task::Task;
use crate::util::unicode::{display_width, pad_to_width};

/// Titles wider than this are truncated in list output
pub const MAX_TITLE_WIDTH: usize = 48;

/// Shown instead of the id while a create is still in flight
const PENDING_ID: &str = "(saving)";

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

fn check_char(task: &Task) -> char {
    if task.done { 'x' } else { ' ' }
}

fn shown_id(task: &Task) -> &str {
    if task.is_placeholder() {
        PENDING_ID
    } else {
        &task.id
    }
}

/// Category, due date and archived marker, in display order
fn extras(task: &Task) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(category) = &task.category {
        out.push(format!("#{}", category));
    }
    if let Some(due) = task.due_date {
        out.push(format!("due {}", due.format("%Y-%m-%d")));
    }
    if task.archived {
        out.push("(archived)".to_string());
    }
    out
}

fn render_row(task: &Task, id_width: usize, title_width: usize) -> String {
    let mut line = format!(
        "[{}] {}  {}",
        check_char(task),
        pad_to_width(shown_id(task), id_width),
        pad_to_width(&task.title, title_width)
    );
    for extra in extras(task) {
        line.push_str("  ");
        line.push_str(&extra);
    }
    line.trim_end().to_string()
}

/// Format a single task as a one-line summary
pub fn format_task_line(task: &Task) -> String {
    render_row(
        task,
        display_width(shown_id(task)),
        display_width(&task.title).min(MAX_TITLE_WIDTH),
    )
}

/// One aligned line per task, ids and titles padded to a shared width.
pub fn format_task_rows(tasks: &[Task]) -> Vec<String> {
    let id_width = tasks
        .iter()
        .map(|t| display_width(shown_id(t)))
        .max()
        .unwrap_or(0);
    let title_width = tasks
        .iter()
        .map(|t| display_width(&t.title))
        .max()
        .unwrap_or(0)
        .min(MAX_TITLE_WIDTH);
    tasks
        .iter()
        .map(|t| render_row(t, id_width, title_width))
        .collect()
}

/// Rows for a list, or a single `No items` line when it is empty
pub fn format_task_list(tasks: &[Task]) -> Vec<String> {
    if tasks.is_empty() {
        return vec!["No items".to_string()];
    }
    format_task_rows(tasks)
}

/// Status line under the interactive list
pub fn format_status(key: &QueryKey, in_flight: usize, error: Option<&str>) -> String {
    let mut parts = vec![key.to_string()];
    if in_flight > 0 {
        parts.push(format!("{} pending", in_flight));
    }
    if let Some(message) = error {
        parts.push(format!("error: {}", message));
    }
    parts.join("  |  ")
}
