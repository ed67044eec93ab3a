//! `td shell`: an interactive session over one [`Board`].
//!
//! Input is read line by line; every intent is spawned on a `LocalSet` so
//! several requests can be in flight while the prompt stays responsive. The
//! list is re-rendered from cache events rather than from intent results.

use std::rc::Rc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::LocalSet;
use tracing::debug;

use crate::cli::output::{format_status, format_task_rows};
use crate::model::query::{DoneFilter, SortField, SortOrder};
use crate::model::task::{NewTask, Task, TaskPatch, ToggleField, ToggleIntent};
use crate::ops::board::Board;
use crate::ops::cache::CacheEvent;

const HELP: &str = "\
commands:
  ls                          show the list
  add <title> [@category]     add a task
  done <ref> [true|false]     toggle done
  archive <ref> [true|false]  toggle archived
  edit <ref> <title>          rename a task
  rm <ref>                    delete a task
  filter category <name>      only tasks in a category (no name: any)
  filter done <all|true|false>
  filter archived <on|off>
  filter clear
  sort <field> [asc|desc]
  refresh                     refetch the list
  help | quit
<ref> is a row number like #2, or a task id";

/// Row reference: `#n` (1-based, as displayed) or a task id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Row(usize),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Category(Option<String>),
    Done(DoneFilter),
    Archived(bool),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    List,
    Add(NewTask),
    Toggle {
        target: Target,
        field: ToggleField,
        intent: ToggleIntent,
    },
    Edit {
        target: Target,
        title: String,
    },
    Remove(Target),
    Filter(FilterChange),
    Sort {
        field: SortField,
        order: Option<SortOrder>,
    },
    Refresh,
    Help,
    Quit,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_target(word: Option<&str>) -> Result<Target, String> {
    let word = word.ok_or("missing task reference")?;
    match word.strip_prefix('#') {
        Some(n) => match n.parse::<usize>() {
            Ok(row) if row > 0 => Ok(Target::Row(row)),
            _ => Err(format!("bad row reference '{}'", word)),
        },
        None => Ok(Target::Id(word.to_string())),
    }
}

fn parse_intent(word: Option<&str>) -> Result<ToggleIntent, String> {
    match word {
        None => Ok(ToggleIntent::Flip),
        Some("true") => Ok(ToggleIntent::SetTo(true)),
        Some("false") => Ok(ToggleIntent::SetTo(false)),
        Some(other) => Err(format!("expected true or false, got '{}'", other)),
    }
}

pub fn parse_line(line: &str) -> Result<ShellCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(ShellCommand::Empty);
    };
    let rest: Vec<&str> = words.collect();

    match verb {
        "ls" | "list" => Ok(ShellCommand::List),
        "add" => {
            let (categories, title): (Vec<&str>, Vec<&str>) = rest
                .iter()
                .copied()
                .partition(|w| w.starts_with('@') && w.len() > 1);
            let mut input = NewTask::new(title.join(" "));
            if let Some(category) = categories.last() {
                input = input.with_category(category.trim_start_matches('@'));
            }
            Ok(ShellCommand::Add(input))
        }
        "done" | "archive" => {
            let field = if verb == "done" {
                ToggleField::Done
            } else {
                ToggleField::Archived
            };
            Ok(ShellCommand::Toggle {
                target: parse_target(rest.first().copied())?,
                field,
                intent: parse_intent(rest.get(1).copied())?,
            })
        }
        "edit" => Ok(ShellCommand::Edit {
            target: parse_target(rest.first().copied())?,
            title: rest.get(1..).unwrap_or_default().join(" "),
        }),
        "rm" | "delete" => Ok(ShellCommand::Remove(parse_target(rest.first().copied())?)),
        "filter" => {
            let change = match rest.as_slice() {
                ["category"] => FilterChange::Category(None),
                ["category", name @ ..] => FilterChange::Category(Some(name.join(" "))),
                ["done", value] => FilterChange::Done(value.parse()?),
                ["archived", "on"] => FilterChange::Archived(true),
                ["archived", "off"] => FilterChange::Archived(false),
                ["clear"] => FilterChange::Clear,
                _ => return Err("usage: filter category|done|archived|clear ...".to_string()),
            };
            Ok(ShellCommand::Filter(change))
        }
        "sort" => {
            let field = rest.first().ok_or("usage: sort <field> [asc|desc]")?.parse()?;
            let order = rest.get(1).map(|o| o.parse()).transpose()?;
            Ok(ShellCommand::Sort { field, order })
        }
        "refresh" => Ok(ShellCommand::Refresh),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" | "q" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command '{}' (try help)", other)),
    }
}

/// Resolve a target against the rows currently on screen.
fn resolve(target: &Target, tasks: &[Task]) -> Result<String, String> {
    match target {
        Target::Row(n) => tasks
            .get(n - 1)
            .map(|t| t.id.clone())
            .ok_or_else(|| format!("no row #{}", n)),
        Target::Id(id) => Ok(id.clone()),
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub fn run(runtime: Runtime, board: Board) -> Result<(), Box<dyn std::error::Error>> {
    let local = LocalSet::new();
    let result = local.block_on(&runtime, session(Rc::new(board)));
    // Pending intents are abandoned on quit
    runtime.shutdown_background();
    result
}

async fn session(board: Rc<Board>) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = board.subscribe();
    let mut errors = board.errors();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("type 'help' for commands");
    spawn_list(&board);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Ok(ShellCommand::Quit) => break,
                    Ok(command) => {
                        if let Err(message) = execute(&board, command) {
                            println!("{}", message);
                        }
                    }
                    Err(message) => println!("{}", message),
                }
            }
            event = events.recv() => match event {
                Ok(CacheEvent::Updated(key)) if key == board.key() => render(&board),
                Ok(CacheEvent::Updated(_)) => {}
                Ok(CacheEvent::Invalidated(_)) => spawn_refresh(&board),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "cache events lagged");
                    render(&board);
                }
                Err(RecvError::Closed) => break,
            },
            changed = errors.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(message) = errors.borrow_and_update().clone() {
                    println!("error: {}", message);
                }
            }
        }
    }
    Ok(())
}

/// Apply a parsed command. Network work is spawned; only resolution
/// errors are reported here.
fn execute(board: &Rc<Board>, command: ShellCommand) -> Result<(), String> {
    match command {
        ShellCommand::Empty => {}
        ShellCommand::List => render(board),
        ShellCommand::Help => println!("{}", HELP),
        ShellCommand::Quit => {}
        ShellCommand::Refresh => {
            let board = Rc::clone(board);
            tokio::task::spawn_local(async move {
                let _ = board.refresh().await;
            });
        }
        ShellCommand::Add(input) => {
            let board = Rc::clone(board);
            tokio::task::spawn_local(async move {
                let _ = board.create(input).await;
            });
        }
        ShellCommand::Toggle {
            target,
            field,
            intent,
        } => {
            let id = resolve(&target, &board.tasks())?;
            let board = Rc::clone(board);
            tokio::task::spawn_local(async move {
                let _ = board.toggle(&id, field, intent).await;
            });
        }
        ShellCommand::Edit { target, title } => {
            let id = resolve(&target, &board.tasks())?;
            let patch = TaskPatch {
                title: Some(title),
                ..Default::default()
            };
            let board = Rc::clone(board);
            tokio::task::spawn_local(async move {
                let _ = board.update(&id, patch).await;
            });
        }
        ShellCommand::Remove(target) => {
            let id = resolve(&target, &board.tasks())?;
            let board = Rc::clone(board);
            tokio::task::spawn_local(async move {
                let _ = board.remove(&id).await;
            });
        }
        ShellCommand::Filter(change) => {
            let changed = board.select(|s| match change {
                FilterChange::Category(category) => s.category = category,
                FilterChange::Done(done) => s.done = done,
                FilterChange::Archived(on) => s.include_archived = on,
                FilterChange::Clear => {
                    s.category = None;
                    s.done = DoneFilter::All;
                    s.include_archived = false;
                }
            });
            reselect(board, changed);
        }
        ShellCommand::Sort { field, order } => {
            let changed = board.select(|s| {
                s.sort = Some(field);
                if order.is_some() {
                    s.order = order;
                }
            });
            reselect(board, changed);
        }
    }
    Ok(())
}

/// Show whatever is cached for the new key, then load it.
fn reselect(board: &Rc<Board>, changed: bool) {
    if changed {
        render(board);
        spawn_list(board);
    }
}

fn spawn_list(board: &Rc<Board>) {
    let board = Rc::clone(board);
    tokio::task::spawn_local(async move {
        let _ = board.list().await;
    });
}

fn spawn_refresh(board: &Rc<Board>) {
    let board = Rc::clone(board);
    tokio::task::spawn_local(async move {
        let _ = board.refresh_if_stale().await;
    });
}

fn render(board: &Board) {
    let tasks = board.tasks();
    println!();
    if tasks.is_empty() {
        println!("  No items");
    }
    let number_width = tasks.len().to_string().len() + 1;
    for (i, row) in format_task_rows(&tasks).iter().enumerate() {
        println!("{:>width$} {}", format!("#{}", i + 1), row, width = number_width);
    }
    println!(
        "{}",
        format_status(
            &board.key(),
            board.in_flight(),
            board.last_error().as_deref()
        )
    );
}
