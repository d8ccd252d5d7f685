use std::collections::BTreeSet;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::classify::{Bucket, classify};
use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::{midnight, parse_date_expr};
use crate::group::build_groups;
use crate::render::Renderer;
use crate::task::{BulkCompleteRequest, TaskType};
use crate::text::format_task_text;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "board",
        "list",
        "groups",
        "text",
        "complete",
        "export",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &str, known: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = known.iter().copied().find(|name| *name == token) {
        return Some(exact);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Clock readings for one invocation: the wall clock and the day tasks are
/// bucketed against.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub now: DateTime<Utc>,
    pub today: DateTime<Utc>,
}

impl Clock {
    pub fn new(now: DateTime<Utc>, today_expr: Option<&str>) -> anyhow::Result<Self> {
        let today = match today_expr {
            Some(expr) => midnight(parse_date_expr(expr, now).context("invalid --today value")?),
            None => midnight(now),
        };
        Ok(Self { now, today })
    }
}

#[instrument(skip(store, cfg, renderer, inv, clock))]
pub fn dispatch(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
    clock: Clock,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();

    debug!(
        command,
        args = ?inv.command_args,
        today = %clock.today,
        "dispatching command"
    );

    match command {
        "board" => cmd_board(store, cfg, renderer, clock),
        "list" => cmd_list(store, cfg, renderer, &inv.command_args, clock),
        "groups" => cmd_groups(store, renderer, clock),
        "text" => cmd_text(store, cfg, renderer, &inv.command_args, clock),
        "complete" => cmd_complete(store, &inv.command_args, clock),
        "export" => cmd_export(store, cfg, clock),
        "_commands" => cmd_commands(),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, cfg, renderer, clock))]
fn cmd_board(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    clock: Clock,
) -> anyhow::Result<()> {
    info!("command board");

    let tasks = store.load_tasks(clock.now)?;
    let items = build_groups(&tasks);
    let sorted = classify(&items, clock.today, &cfg.classify_options()?);
    renderer.print_board(&sorted, clock.today)
}

#[instrument(skip(store, cfg, renderer, args, clock))]
fn cmd_list(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    clock: Clock,
) -> anyhow::Result<()> {
    info!("command list");

    let name = args
        .first()
        .ok_or_else(|| anyhow!("list needs a bucket: overdue, week, active, next, completed"))?;
    let bucket = Bucket::parse(name).ok_or_else(|| anyhow!("unknown bucket: {name}"))?;

    let tasks = store.load_tasks(clock.now)?;
    let items = build_groups(&tasks);
    let sorted = classify(&items, clock.today, &cfg.classify_options()?);
    renderer.print_bucket(&sorted, bucket, clock.today)
}

#[instrument(skip(store, renderer, clock))]
fn cmd_groups(store: &mut DataStore, renderer: &mut Renderer, clock: Clock) -> anyhow::Result<()> {
    info!("command groups");

    let tasks = store.load_tasks(clock.now)?;
    renderer.print_groups(&build_groups(&tasks))
}

#[instrument(skip(store, cfg, renderer, args, clock))]
fn cmd_text(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    clock: Clock,
) -> anyhow::Result<()> {
    info!("command text");

    let id = args.first().ok_or_else(|| anyhow!("text needs a task id"))?;
    let task = store.find_task(id, clock.now)?;
    let text = format_task_text(&task, clock.today, cfg.show_start());
    renderer.print_task_text(&task.id, &text)
}

#[instrument(skip(store, args, clock))]
fn cmd_complete(store: &mut DataStore, args: &[String], clock: Clock) -> anyhow::Result<()> {
    info!("command complete");

    let request = parse_complete_args(store, args, clock)?;
    let updated = store.bulk_complete(&request, clock.now)?;

    println!("Completed {} task(s).", updated.len());
    Ok(())
}

/// Builds a bulk-complete request from `<id>... [date:<expr>] [type:<kind>]`.
/// Without `type:` the type of the listed tasks is used, which must agree.
fn parse_complete_args(
    store: &mut DataStore,
    args: &[String],
    clock: Clock,
) -> anyhow::Result<BulkCompleteRequest> {
    let mut task_ids = Vec::new();
    let mut date = clock.today;
    let mut kind: Option<TaskType> = None;

    for arg in args {
        if let Some(raw) = arg.strip_prefix("date:") {
            date = midnight(parse_date_expr(raw, clock.now)?);
        } else if let Some(raw) = arg.strip_prefix("type:") {
            kind = Some(raw.parse()?);
        } else {
            task_ids.push(arg.clone());
        }
    }

    if task_ids.is_empty() {
        return Err(anyhow!("complete needs at least one task id"));
    }

    let kind = match kind {
        Some(kind) => kind,
        None => {
            let tasks = store.load_tasks(clock.now)?;
            let kinds: BTreeSet<&'static str> = tasks
                .iter()
                .filter(|task| task_ids.contains(&task.id))
                .map(|task| task.kind.as_str())
                .collect();
            match kinds.len() {
                0 => return Err(anyhow!("none of the given task ids exist")),
                1 => kinds
                    .first()
                    .ok_or_else(|| anyhow!("task type lookup failed"))?
                    .parse()?,
                _ => {
                    return Err(anyhow!(
                        "tasks have mixed types ({}); pass type:<kind>",
                        kinds.into_iter().collect::<Vec<_>>().join(", ")
                    ));
                }
            }
        }
    };

    Ok(BulkCompleteRequest {
        task_ids,
        date,
        kind,
    })
}

#[instrument(skip(store, cfg, clock))]
fn cmd_export(store: &mut DataStore, cfg: &Config, clock: Clock) -> anyhow::Result<()> {
    info!("command export");

    let tasks = store.load_tasks(clock.now)?;
    let items = build_groups(&tasks);
    let sorted = classify(&items, clock.today, &cfg.classify_options()?);

    let out = serde_json::to_string_pretty(&sorted)?;
    println!("{out}");
    Ok(())
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Commands: board, list <overdue|week|active|next|completed>, groups, text <id>, \
         complete <id>... [date:<when>] [type:<kind>], export"
    );
    Ok(())
}
