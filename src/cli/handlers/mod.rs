mod shell;

use std::sync::Arc;
use std::time::Duration;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::http::HttpTransport;
use crate::io::transport::Transport;
use crate::model::config::{ClientConfig, DefaultsConfig};
use crate::model::query::Selection;
use crate::model::task::{NewTask, Task, TaskPatch, ToggleField, ToggleIntent, parse_due_date};
use crate::ops::board::Board;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let config = config_io::load_config(cli.config.as_deref(), cli.api.as_deref())?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        // Read commands
        Commands::Ls(args) => {
            let board = open_board(&config, &args)?;
            runtime.block_on(cmd_ls(&board, json))
        }
        Commands::Shell(args) => {
            let board = open_board(&config, &args)?;
            shell::run(runtime, board)
        }

        // Write commands
        Commands::Add(args) => {
            let board = open_board(&config, &ListArgs::default())?;
            runtime.block_on(cmd_add(&board, args, json))
        }
        Commands::Done(args) => {
            let board = open_board(&config, &ListArgs::default())?;
            runtime.block_on(cmd_toggle(&board, ToggleField::Done, args, json))
        }
        Commands::Archive(args) => {
            let board = open_board(&config, &ListArgs::default())?;
            runtime.block_on(cmd_toggle(&board, ToggleField::Archived, args, json))
        }
        Commands::Edit(args) => {
            let board = open_board(&config, &ListArgs::default())?;
            runtime.block_on(cmd_edit(&board, args, json))
        }
        Commands::Rm(args) => {
            let board = open_board(&config, &ListArgs::default())?;
            runtime.block_on(cmd_rm(&board, args, json))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_board(config: &ClientConfig, args: &ListArgs) -> Result<Board, Box<dyn std::error::Error>> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        &config.api.base_url,
        Duration::from_secs(config.api.timeout_secs),
    )?);
    Ok(Board::new(transport, selection_for(&config.defaults, args)))
}

/// Config defaults, overridden by whatever filter flags were given
fn selection_for(defaults: &DefaultsConfig, args: &ListArgs) -> Selection {
    let mut selection = defaults.to_selection();
    if let Some(category) = &args.category {
        selection.category = Some(category.clone());
    }
    if let Some(done) = args.done {
        selection.done = done;
    }
    if args.sort.is_some() {
        selection.sort = args.sort;
    }
    if args.order.is_some() {
        selection.order = args.order;
    }
    if args.archived {
        selection.include_archived = true;
    }
    selection
}

fn print_task(task: &Task, json: bool) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(task)?);
    } else {
        println!("{}", format_task_line(task));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_ls(board: &Board, json: bool) -> CmdResult {
    let tasks = board.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&*tasks)?);
    } else {
        for line in format_task_list(&tasks) {
            println!("{}", line);
        }
    }
    Ok(())
}

async fn cmd_add(board: &Board, args: AddArgs, json: bool) -> CmdResult {
    let mut input = NewTask::new(args.title);
    if let Some(category) = args.category {
        input = input.with_category(category);
    }
    if let Some(due) = args.due.as_deref() {
        input = input.with_due_date(parse_due_date(due)?);
    }
    let task = board.create(input).await?;
    print_task(&task, json)
}

async fn cmd_toggle(board: &Board, field: ToggleField, args: ToggleArgs, json: bool) -> CmdResult {
    let intent = ToggleIntent::from(args.set);
    let task = board.toggle(&args.id, field, intent).await?;
    print_task(&task, json)
}

async fn cmd_edit(board: &Board, args: EditArgs, json: bool) -> CmdResult {
    let patch = TaskPatch {
        title: args.title,
        category: args.category,
        due_date: args.due.as_deref().map(parse_due_date).transpose()?,
        ..Default::default()
    };
    let task = board.update(&args.id, patch).await?;
    print_task(&task, json)
}

async fn cmd_rm(board: &Board, args: RemoveArgs, json: bool) -> CmdResult {
    board.remove(&args.id).await?;
    if json {
        println!("{}", serde_json::json!({ "ok": true, "id": args.id }));
    } else {
        println!("deleted {}", args.id);
    }
    Ok(())
}
