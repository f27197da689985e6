//! `tally comment` — add a note to a task's history.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use super::Context;
use super::show::resolve_task_id;
use crate::output::render_mode;

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Task to comment on.
    pub id: String,

    /// Comment text.
    pub text: String,
}

#[derive(Debug, Serialize)]
struct Commented {
    id: String,
    who: String,
}

/// Append a comment.
///
/// # Errors
///
/// Fails on empty text or any ledger error.
pub fn run_comment(args: &CommentArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let id = resolve_task_id(&args.id, &ctx.project().ledger.id_prefix);
    ctx.ledger()
        .comment_on_task(&id, &actor, &args.text)
        .map_err(|e| ctx.fail(&e))?;
    render_mode(
        ctx.output,
        &Commented { id, who: actor },
        |r, w| writeln!(w, "commented {}", r.id),
        |r, w| writeln!(w, "✓ {} commented on {}", r.who, r.id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_args_take_id_and_text() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: CommentArgs,
        }
        let w = Wrapper::parse_from(["test", "TASK-001", "needs a rebase"]);
        assert_eq!(w.args.id, "TASK-001");
        assert_eq!(w.args.text, "needs a rebase");
    }
}
