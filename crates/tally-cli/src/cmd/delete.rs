//! `tally delete` — remove a task. A backup is taken first.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use super::Context;
use super::show::resolve_task_id;
use crate::output::render_mode;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Task to delete.
    pub id: String,

    /// Delete even if other tasks depend on it or it is claimed.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct Deleted {
    id: String,
    title: String,
    /// Tasks still naming the deleted id.
    dangling: Vec<String>,
}

/// Delete a task.
///
/// # Errors
///
/// Fails if the task has dependents or an active claim (without `--force`),
/// or on any ledger error.
pub fn run_delete(args: &DeleteArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let id = resolve_task_id(&args.id, &ctx.project().ledger.id_prefix);
    let ledger = ctx.ledger();
    let removed = ledger
        .delete_task(&id, &actor, args.force)
        .map_err(|e| ctx.fail(&e))?;

    let dangling = if args.force {
        ledger
            .read()
            .map(|s| {
                s.document
                    .tasks
                    .iter()
                    .filter(|t| t.depends_on.contains(&id) || t.blocks.contains(&id))
                    .map(|t| t.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    render_mode(
        ctx.output,
        &Deleted {
            id,
            title: removed.title,
            dangling,
        },
        |r, w| writeln!(w, "deleted {}", r.id),
        |r, w| {
            writeln!(w, "✓ Deleted {} · {}", r.id, r.title)?;
            if !r.dangling.is_empty() {
                writeln!(w, "  Still referenced by: {}", r.dangling.join(", "))?;
                writeln!(w, "  Run `tally validate` to review.")?;
            }
            Ok(())
        },
    )
}
