//! `tally reopen` — send a done task back to work.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use super::Context;
use super::show::resolve_task_id;
use crate::output::render_mode;

#[derive(Args, Debug)]
pub struct ReopenArgs {
    /// Task to reopen.
    pub id: String,

    /// Why it is being reopened.
    #[arg(short, long)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct Reopened {
    id: String,
    status: &'static str,
}

/// Reopen a done task.
///
/// # Errors
///
/// Fails if the task is not done, or on any ledger error.
pub fn run_reopen(args: &ReopenArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let id = resolve_task_id(&args.id, &ctx.project().ledger.id_prefix);
    ctx.ledger()
        .reopen_task(&id, &actor, args.reason.as_deref())
        .map_err(|e| ctx.fail(&e))?;
    render_mode(
        ctx.output,
        &Reopened { id, status: "reopened" },
        |r, w| writeln!(w, "reopened {}", r.id),
        |r, w| writeln!(w, "✓ Reopened {}", r.id),
    )
}
