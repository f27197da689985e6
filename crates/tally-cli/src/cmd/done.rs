//! `tally done` — complete a task and unblock whatever was waiting on it.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use super::Context;
use super::show::resolve_task_id;
use crate::output::render_mode;

#[derive(Args, Debug)]
pub struct DoneArgs {
    /// Task to mark as done.
    pub id: String,

    /// Completion note for the history.
    #[arg(short, long)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
struct DoneResult {
    id: String,
    unblocked: Vec<String>,
}

/// Complete a task.
///
/// # Errors
///
/// Fails if the task is already done, or on any ledger error.
pub fn run_done(args: &DoneArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let id = resolve_task_id(&args.id, &ctx.project().ledger.id_prefix);
    let unblocked = ctx
        .ledger()
        .complete_task(&id, &actor, args.note.as_deref())
        .map_err(|e| ctx.fail(&e))?;

    render_mode(
        ctx.output,
        &DoneResult { id, unblocked },
        |r, w| {
            writeln!(w, "done {}", r.id)?;
            for id in &r.unblocked {
                writeln!(w, "unblocked {id}")?;
            }
            Ok(())
        },
        |r, w| {
            writeln!(w, "✓ Completed {}", r.id)?;
            if !r.unblocked.is_empty() {
                writeln!(w, "  Unblocked: {}", r.unblocked.join(", "))?;
            }
            Ok(())
        },
    )
}
