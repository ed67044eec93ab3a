use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::model::query::{DoneFilter, SortField, SortOrder};

#[derive(Parser)]
#[command(name = "td", about = concat!("td v", env!("CARGO_PKG_VERSION"), " - a task list client with optimistic updates"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Server base URL (overrides config and ANYTODO_API_BASE)
    #[arg(long, global = true, value_name = "URL")]
    pub api: Option<String>,

    /// Read configuration from this file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output on stderr (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tasks
    Ls(ListArgs),
    /// Add a task
    Add(AddArgs),
    /// Toggle a task's done flag
    Done(ToggleArgs),
    /// Toggle a task's archived flag
    Archive(ToggleArgs),
    /// Edit a task's title, category or due date
    Edit(EditArgs),
    /// Delete a task
    Rm(RemoveArgs),
    /// Interactive session
    Shell(ListArgs),
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

/// Filter and sort flags. Unset flags fall back to the config defaults.
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only tasks in this category
    #[arg(long)]
    pub category: Option<String>,
    /// Filter on the done flag (all, true, false)
    #[arg(long, value_name = "FILTER")]
    pub done: Option<DoneFilter>,
    /// Sort field (createdAt, title, dueDate, category, done, archived)
    #[arg(long, value_name = "FIELD")]
    pub sort: Option<SortField>,
    /// Sort order (asc, desc)
    #[arg(long)]
    pub order: Option<SortOrder>,
    /// Include archived tasks
    #[arg(long)]
    pub archived: bool,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct AddArgs {
    /// Task title
    pub title: String,
    /// Category
    #[arg(long)]
    pub category: Option<String>,
    /// Due date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE")]
    pub due: Option<String>,
}

#[derive(Args)]
pub struct ToggleArgs {
    /// Task ID
    pub id: String,
    /// Set the flag to this value instead of flipping it
    #[arg(long, value_name = "BOOL")]
    pub set: Option<bool>,
}

#[derive(Args)]
pub struct EditArgs {
    /// Task ID
    pub id: String,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// New category
    #[arg(long)]
    pub category: Option<String>,
    /// New due date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE")]
    pub due: Option<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Task ID
    pub id: String,
}
