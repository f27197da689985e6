//! `tally edit` — patch fields on a task; `tally deliverable` — tick one off.
//!
//! All changed fields land in a single `edited` history entry. New
//! dependencies are checked for cycles before anything is written.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use tally_core::model::{Priority, Status, normalize_agent_name};
use tally_core::ops::TaskEdit;

use super::show::resolve_task_id;
use super::{Context, split_list};
use crate::output::{CliError, render_error, render_mode};

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Task to edit.
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub status: Option<Status>,

    #[arg(long)]
    pub priority: Option<Priority>,

    /// Assign to an agent.
    #[arg(long, conflicts_with = "unassign")]
    pub assign: Option<String>,

    #[arg(long)]
    pub unassign: bool,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<NaiveDate>,

    #[arg(long)]
    pub clear_due: bool,

    /// Replace the tag list (comma-separated or repeated).
    #[arg(long)]
    pub tags: Option<Vec<String>>,

    /// Replace the dependency list.
    #[arg(long)]
    pub depends_on: Option<Vec<String>>,

    /// Replace the blocks list.
    #[arg(long)]
    pub blocks: Option<Vec<String>>,

    #[arg(long)]
    pub estimate: Option<f64>,

    /// Hours actually spent.
    #[arg(long)]
    pub actual: Option<f64>,

    #[arg(long)]
    pub description: Option<String>,
}

impl EditArgs {
    fn to_edit(&self, prefix: &str) -> TaskEdit {
        let ids = |values: &Vec<String>| -> Vec<String> {
            split_list(values)
                .iter()
                .map(|v| resolve_task_id(v, prefix))
                .collect()
        };
        let assigned_to = if self.unassign {
            Some(None)
        } else {
            self.assign.as_deref().map(|a| Some(normalize_agent_name(a)))
        };
        let due = if self.clear_due {
            Some(None)
        } else {
            self.due.map(Some)
        };
        TaskEdit {
            title: self.title.clone(),
            status: self.status,
            priority: self.priority,
            assigned_to,
            due,
            tags: self.tags.as_ref().map(|t| split_list(t)),
            depends_on: self.depends_on.as_ref().map(ids),
            blocks: self.blocks.as_ref().map(ids),
            estimated_hours: self.estimate.map(Some),
            actual_hours: self.actual.map(Some),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Edited {
    id: String,
}

/// Apply an edit.
///
/// # Errors
///
/// Fails on unknown references, a dependency cycle, a no-op edit, or any
/// ledger error.
pub fn run_edit(args: &EditArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let id = resolve_task_id(&args.id, &ctx.project().ledger.id_prefix);
    let edit = args.to_edit(&ctx.project().ledger.id_prefix);
    ctx.ledger()
        .edit_task(&id, edit, &actor)
        .map_err(|e| ctx.fail(&e))?;
    render_mode(
        ctx.output,
        &Edited { id },
        |r, w| writeln!(w, "edited {}", r.id),
        |r, w| writeln!(w, "✓ Updated {}", r.id),
    )
}

#[derive(Args, Debug)]
pub struct DeliverableArgs {
    /// Task owning the deliverable.
    pub id: String,

    /// Deliverable name, as listed on the task.
    pub name: String,

    /// Mark it open again instead of done.
    #[arg(long)]
    pub undo: bool,
}

#[derive(Debug, Serialize)]
struct DeliverableResult {
    id: String,
    name: String,
    done: bool,
}

/// Tick a deliverable done (or open with `--undo`).
///
/// # Errors
///
/// Fails if the deliverable does not exist or is already in that state.
pub fn run_deliverable(args: &DeliverableArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    if args.name.trim().is_empty() {
        render_error(ctx.output, &CliError::new("deliverable name is empty"))?;
        anyhow::bail!("deliverable name is empty");
    }
    let id = resolve_task_id(&args.id, &ctx.project().ledger.id_prefix);
    let done = !args.undo;
    ctx.ledger()
        .set_deliverable(&id, &args.name, done, &actor)
        .map_err(|e| ctx.fail(&e))?;
    render_mode(
        ctx.output,
        &DeliverableResult {
            id,
            name: args.name.clone(),
            done,
        },
        |r, w| writeln!(w, "{} {} {}", r.id, r.name, if r.done { "done" } else { "open" }),
        |r, w| writeln!(w, "✓ {} [{}] {}", r.id, if r.done { "x" } else { " " }, r.name),
    )
}
