//! `tally archive` — drop finished tasks from the ledger. A backup is taken first.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use super::Context;
use crate::output::render_mode;

#[derive(Args, Debug, Default)]
pub struct ArchiveArgs {}

#[derive(Debug, Serialize)]
struct Archived {
    archived: Vec<String>,
}

/// Archive done tasks that nothing live depends on.
///
/// # Errors
///
/// Any ledger or backup error.
pub fn run_archive(_args: &ArchiveArgs, ctx: &Context) -> Result<()> {
    let removed = ctx.ledger().archive_completed().map_err(|e| ctx.fail(&e))?;
    let result = Archived {
        archived: removed.into_iter().map(|t| t.id).collect(),
    };
    render_mode(
        ctx.output,
        &result,
        |r, w| {
            for id in &r.archived {
                writeln!(w, "archived {id}")?;
            }
            Ok(())
        },
        |r, w| {
            if r.archived.is_empty() {
                writeln!(w, "Nothing to archive.")
            } else {
                writeln!(w, "✓ Archived {} task(s): {}", r.archived.len(), r.archived.join(", "))
            }
        },
    )
}
