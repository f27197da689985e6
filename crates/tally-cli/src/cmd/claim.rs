//! `tally claim` / `tally release` — take and give back a task.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use super::Context;
use super::show::resolve_task_id;
use crate::output::render_mode;

#[derive(Args, Debug)]
pub struct ClaimArgs {
    /// Task to claim.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Task to release.
    pub id: String,

    /// Why the claim is being given up.
    #[arg(short, long)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClaimResult {
    id: String,
    actor: String,
    claimed: bool,
}

fn report(ctx: &Context, result: &ClaimResult) -> Result<()> {
    let verb = if result.claimed { "claimed" } else { "released" };
    render_mode(
        ctx.output,
        result,
        |r, w| writeln!(w, "{verb} {} {}", r.id, r.actor),
        |r, w| writeln!(w, "✓ {} {verb} {}", r.actor, r.id),
    )
}

/// Claim a task for the current actor.
///
/// # Errors
///
/// Fails if the task is already claimed or done, or on any ledger error.
pub fn run_claim(args: &ClaimArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let id = resolve_task_id(&args.id, &ctx.project().ledger.id_prefix);
    ctx.ledger()
        .claim_task(&id, &actor)
        .map_err(|e| ctx.fail(&e))?;
    report(ctx, &ClaimResult { id, actor, claimed: true })
}

/// Release the current actor's claim.
///
/// # Errors
///
/// Fails if the task is unclaimed or claimed by someone else.
pub fn run_release(args: &ReleaseArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let id = resolve_task_id(&args.id, &ctx.project().ledger.id_prefix);
    ctx.ledger()
        .release_task(&id, &actor, args.note.as_deref())
        .map_err(|e| ctx.fail(&e))?;
    report(ctx, &ClaimResult { id, actor, claimed: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ReleaseArgs,
    }

    #[test]
    fn release_note_is_optional() {
        let w = Wrapper::parse_from(["test", "TASK-001"]);
        assert_eq!(w.args.id, "TASK-001");
        assert!(w.args.note.is_none());

        let w = Wrapper::parse_from(["test", "3", "-n", "blocked on review"]);
        assert_eq!(w.args.note.as_deref(), Some("blocked on review"));
    }
}
